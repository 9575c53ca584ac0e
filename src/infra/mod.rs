//! AWS integrations used only by the command-line tool.

pub mod s3;
