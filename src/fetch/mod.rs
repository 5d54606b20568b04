//! Feed retrieval.
//!
//! Both helpers issue exactly one request and stream the response body to a
//! file, so a large feed never has to fit in memory. Anything but `200 OK`
//! is a [`FeedError::HttpStatus`].

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::FeedError;
use anyhow::{Context, Result};
use reqwest::{Method, Response, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// GETs `url` and writes the body to `dest`, returning the number of bytes.
#[tracing::instrument(skip(client, dest), fields(dest = %dest.display()))]
pub async fn fetch_to_file<C: HttpClient>(client: &C, url: &str, dest: &Path) -> Result<u64> {
    let req = client.request(Method::GET, url).build()?;
    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("failed to get URL {url}"))?;
    save_response(resp, url, dest).await
}

/// POSTs `fields` as an url-encoded form and writes the body to `dest`.
#[tracing::instrument(skip(client, fields, dest), fields(dest = %dest.display()))]
pub async fn submit_form<C: HttpClient>(
    client: &C,
    url: &str,
    fields: &[(&str, &str)],
    dest: &Path,
) -> Result<u64> {
    let req = client.request(Method::POST, url).form(fields).build()?;
    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("failed to send POST request to URL {url}"))?;
    save_response(resp, url, dest).await
}

/// Resolves a feed source: URLs are downloaded to `dest`, anything else is
/// taken as a local path and returned as is.
pub async fn fetch_source<C: HttpClient>(client: &C, source: &str, dest: &Path) -> Result<PathBuf> {
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch_to_file(client, source, dest).await?;
        return Ok(dest.to_path_buf());
    }

    let path = PathBuf::from(source);
    tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("feed file {} is not readable", path.display()))?;
    Ok(path)
}

async fn save_response(mut resp: Response, url: &str, dest: &Path) -> Result<u64> {
    let status = resp.status();
    if status != StatusCode::OK {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status,
        }
        .into());
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp
        .chunk()
        .await
        .context("failed to read HTTP response body")?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(bytes = written, "Response saved");
    Ok(written)
}
