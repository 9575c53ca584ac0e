pub mod cache;
pub mod config;
pub mod consumer;
pub mod cursor;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod mode;
pub mod output;
pub mod parser;
pub mod producer;
pub mod record;
pub mod stats;
pub mod transport;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
