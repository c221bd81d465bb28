//! WebDAV client
//!
//! Reqwest-backed [`RemoteSource`] for Nextcloud-style servers: GET for file
//! contents, the preview service for thumbnails, PROPFIND for listings.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use reqwest::{Client, Method, Response};
use tracing::{debug, info, warn};

use super::errors::RemoteError;
use super::types::{Fetched, FileRecord, ListingDecoder, RemoteSource};
use crate::key::{normalize_path, preview_url, Account, ThumbnailParams};

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Properties requested for each listing entry
const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">
  <d:prop>
    <d:getlastmodified/>
    <d:creationdate/>
    <d:getcontentlength/>
    <d:getetag/>
    <d:resourcetype/>
    <oc:fileid/>
  </d:prop>
</d:propfind>"#;

/// WebDAV client shared by all accounts
pub struct DavClient {
    /// HTTP client for making requests
    http_client: Client,
    /// PROPFIND body decoder; listings fail without one
    decoder: Option<Box<dyn ListingDecoder>>,
}

impl DavClient {
    pub fn new() -> Result<Self, RemoteError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            decoder: None,
        })
    }

    /// Attach the decoder used for directory listings
    pub fn with_decoder(mut self, decoder: impl ListingDecoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// URL of a canonical path in the account's WebDAV tree
    pub fn file_url(account: &Account, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", account.dav_base(), encoded.join("/"))
    }

    fn auth_header(account: &Account) -> String {
        let credentials = format!("{}:{}", account.username, account.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        format!("Basic {}", encoded)
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(
        &self,
        operation: &str,
        path: &str,
        f: F,
    ) -> Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let backoff_ms = [500u64, 1000, 2000];
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() || attempt == MAX_RETRIES => {
                    warn!(
                        operation = operation,
                        path = path,
                        error = %e,
                        "Remote operation failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff_ms.get(attempt as usize).copied().unwrap_or(2000);
                    attempt += 1;
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max = MAX_RETRIES,
                        delay_ms = delay,
                        error = %e,
                        "Retrying remote operation"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Send a request and map non-success statuses to errors
    async fn send(
        &self,
        account: &Account,
        method: Method,
        url: &str,
        body: Option<&'static str>,
    ) -> Result<Response, RemoteError> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .header("Authorization", Self::auth_header(account));

        if let Some(body) = body {
            request = request
                .header("Depth", "1")
                .header("Content-Type", "application/xml; charset=utf-8")
                .body(body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            debug!(method = %method, url = url, status = status, "Remote request failed");
            return Err(RemoteError::from_status(status, &body));
        }

        Ok(response)
    }

    async fn get_bytes(&self, account: &Account, url: &str) -> Result<Fetched, RemoteError> {
        let response = self.send(account, Method::GET, url, None).await?;

        let etag = header_value(&response, "etag");
        let content_type = header_value(&response, "content-type");

        let bytes = response.bytes().await?;
        Ok(Fetched {
            bytes: bytes.to_vec(),
            etag,
            content_type,
        })
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
}

impl RemoteSource for DavClient {
    async fn fetch(&self, account: &Account, path: &str) -> Result<Fetched, RemoteError> {
        let url = Self::file_url(account, path);
        debug!(path = path, url = %url, "Downloading file");

        let fetched = self
            .with_retry("fetch", path, || self.get_bytes(account, &url))
            .await?;

        info!(path = path, size = fetched.bytes.len(), "Downloaded file");
        Ok(fetched)
    }

    async fn fetch_thumbnail(
        &self,
        account: &Account,
        path: &str,
        params: &ThumbnailParams,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = preview_url(account, path, params);
        debug!(path = path, url = %url, "Downloading thumbnail");

        let fetched = self
            .with_retry("fetch_thumbnail", path, || self.get_bytes(account, &url))
            .await?;

        Ok(fetched.bytes)
    }

    async fn list_directory(
        &self,
        account: &Account,
        path: &str,
    ) -> Result<Vec<FileRecord>, RemoteError> {
        let decoder = self
            .decoder
            .as_deref()
            .ok_or_else(|| RemoteError::Request("No listing decoder configured".to_string()))?;

        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| RemoteError::Request(e.to_string()))?;
        let url = format!("{}/", Self::file_url(account, path).trim_end_matches('/'));

        let body = self
            .with_retry("list_directory", path, || async {
                let response = self
                    .send(account, method.clone(), &url, Some(PROPFIND_BODY))
                    .await?;
                Ok::<String, RemoteError>(response.text().await?)
            })
            .await?;

        let dav_base = account.dav_base();
        let directory = normalize_path(path, Some(&dav_base));
        let records: Vec<FileRecord> = decoder
            .decode(&body)?
            .into_iter()
            .map(|record| record.canonicalize(Some(&dav_base)))
            // PROPFIND Depth 1 includes the directory itself
            .filter(|record| record.path != directory)
            .collect();

        debug!(path = path, count = records.len(), "Listed directory");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_encodes_segments() {
        let account = Account::new("https://cloud.example.com", "alice", "pw");
        assert_eq!(
            DavClient::file_url(&account, "My Photos/cat #1.jpg"),
            "https://cloud.example.com/remote.php/dav/files/alice/My%20Photos/cat%20%231.jpg"
        );
        assert_eq!(
            DavClient::file_url(&account, ""),
            "https://cloud.example.com/remote.php/dav/files/alice/"
        );
    }

    #[test]
    fn test_auth_header() {
        let account = Account::new("https://cloud.example.com", "alice", "secret");
        // base64("alice:secret")
        assert_eq!(DavClient::auth_header(&account), "Basic YWxpY2U6c2VjcmV0");
    }

    #[tokio::test]
    async fn test_listing_without_decoder_fails_fast() {
        let client = DavClient::new().unwrap();
        let account = Account::new("https://cloud.invalid", "alice", "pw");
        let result = client.list_directory(&account, "Photos").await;
        assert!(matches!(result, Err(RemoteError::Request(_))));
    }
}
