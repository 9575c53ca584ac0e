use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::info;

/// Uploads `body` to `s3://{bucket}/{key}`, gzip-compressing it (and adding
/// a `.gz` suffix to the key) when `gzip` is set. Returns the final key.
#[tracing::instrument(skip(client, body), fields(bytes = body.len()))]
pub async fn upload_json(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    gzip: bool,
) -> Result<String> {
    let (body, key, encoding) = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        (encoder.finish()?, format!("{key}.gz"), Some("gzip"))
    } else {
        (body, key.to_string(), None)
    };

    client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body))
        .content_type("application/json")
        .set_content_encoding(encoding.map(str::to_string))
        .send()
        .await?;

    info!(bucket, key = %key, "Uploaded to S3");
    Ok(key)
}
