// src/fetch/mod.rs
//! Download of the IDEB archive and extraction of its school sheet.

pub mod sheet;
pub mod zips;

use std::time::Instant;

use reqwest::Client;
use tracing::info;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::process::raw_table::RawTable;

pub use zips::{read_sheet_from_zip, read_zip_entry};

/// GET `url` and return the whole body. Non-success statuses are errors.
pub async fn download(client: &Client, url: &str) -> Result<Vec<u8>> {
    let download_err = |source| Error::Download {
        url: url.to_string(),
        source,
    };
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(download_err)?
        .error_for_status()
        .map_err(download_err)?;
    let bytes = resp.bytes().await.map_err(download_err)?;
    Ok(bytes.to_vec())
}

/// Download the configured archive and parse its school sheet.
#[tracing::instrument(level = "info", skip(client, cfg), fields(url = %cfg.url))]
pub async fn fetch_school_sheet(client: &Client, cfg: &FetchConfig) -> Result<RawTable> {
    info!(entry = %cfg.entry, "downloading");
    let start = Instant::now();
    let bytes = download(client, &cfg.url).await?;
    info!(bytes = bytes.len(), elapsed = ?start.elapsed(), "downloaded");

    let table = read_sheet_from_zip(&bytes, cfg)?;
    info!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        "school sheet extracted"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_a_download_error() {
        let cfg = FetchConfig {
            url: "http://127.0.0.1:1/ideb.zip".into(),
            ..FetchConfig::default()
        };
        let err = fetch_school_sheet(&Client::new(), &cfg).await.unwrap_err();
        match err {
            Error::Download { url, source } => {
                assert_eq!(url, "http://127.0.0.1:1/ideb.zip");
                assert!(source.is_connect() || source.is_request());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
