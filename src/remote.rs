//! Remote object metadata and HTTP client setup.

use crate::error::TransferError;
use crate::types::TransferConfig;
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, ETAG};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

/// What the server tells us about the object before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Authoritative object size in bytes.
    pub content_length: u64,
    /// ETag with surrounding quotes removed.
    pub etag: Option<String>,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
}

/// Builds the HTTP client shared by the probe and every segment worker.
pub fn build_client(config: &TransferConfig) -> Result<Client, TransferError> {
    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

fn header_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|len| *len > 0)
}

fn remote_object(headers: &HeaderMap, content_length: u64) -> RemoteObject {
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("W/").trim_matches('"').to_string());
    let accepts_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

    RemoteObject {
        content_length,
        etag,
        accepts_ranges,
    }
}

fn status_error(status: StatusCode, url: &str) -> TransferError {
    if status == StatusCode::NOT_FOUND {
        TransferError::NotFound(url.to_string())
    } else {
        TransferError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }
    }
}

/// Queries the remote object's size once.
///
/// Sends a `HEAD` first, reading `Content-Length` straight from the headers.
/// Servers that reject `HEAD` or omit the length get a `GET` whose body is
/// dropped without being read.
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `url` - Canonical HTTP(S) URL
///
/// # Returns
///
/// The remote metadata, or `NotFound`, `HttpStatus` or
/// `MissingContentLength` when the transfer cannot be planned.
pub async fn probe(client: &Client, url: &str) -> Result<RemoteObject, TransferError> {
    info!("Retrieving object size from {}", url);

    match client.head(url).send().await {
        Ok(response) if response.status().is_success() => {
            if let Some(len) = header_content_length(response.headers()) {
                return Ok(remote_object(response.headers(), len));
            }
            debug!("HEAD for {} carried no usable Content-Length", url);
        }
        Ok(response) if response.status() == StatusCode::NOT_FOUND => {
            return Err(TransferError::NotFound(url.to_string()));
        }
        Ok(response) => {
            debug!("HEAD for {} returned HTTP {}", url, response.status());
        }
        Err(e) => {
            warn!("HEAD request failed for {}: {}", url, e);
        }
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, url));
    }

    let len = header_content_length(response.headers())
        .or_else(|| response.content_length().filter(|len| *len > 0))
        .ok_or_else(|| TransferError::MissingContentLength(url.to_string()))?;
    Ok(remote_object(response.headers(), len))
}
