use anyhow::{Result, anyhow};
use tracing::warn;

pub const TABLE_NAME_PLACEHOLDER: &str = "{table_name}";

/// Splits `s3://bucket/key` into bucket and key.
pub fn parse_s3_url(s3_url: &str) -> Result<(String, String)> {
    let url = url::Url::parse(s3_url)?;
    if url.scheme() != "s3" {
        return Err(anyhow!("Invalid S3 URL scheme"));
    }
    let bucket = url
        .host_str()
        .ok_or(anyhow!("Invalid S3 URL"))?
        .to_string();
    let key = url.path().trim_start_matches('/').to_string();
    Ok((bucket, key))
}

pub fn render_query(template: &str, table_name: &str) -> String {
    if !template.contains(TABLE_NAME_PLACEHOLDER) {
        warn!("Query template has no {} placeholder", TABLE_NAME_PLACEHOLDER);
    }
    template.replace(TABLE_NAME_PLACEHOLDER, table_name)
}
