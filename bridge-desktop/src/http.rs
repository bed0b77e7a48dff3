//! HTTP Range Byte Source using Reqwest
//!
//! Streams a remote file with `Range` requests so seeking does not require
//! downloading the skipped bytes.

use bridge_traits::{
    error::{BridgeError, Result},
    source::{resolve_seek, ByteSource},
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::io::{Read, SeekFrom};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote byte source backed by HTTP range requests
///
/// The response body is consumed lazily: `seek` only records the new
/// position and drops the current body, and the next `read` issues a fresh
/// `Range: bytes=N-` request.
pub struct HttpRangeSource {
    client: Client,
    url: String,
    response: Option<Response>,
    position: u64,
    length: Option<u64>,
    at_end: bool,
}

impl HttpRangeSource {
    /// Open a URL with the default client configuration
    pub fn open(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("pcm-stream-core/0.1.0")
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client: {}", e)))?;

        Self::with_client(client, url)
    }

    /// Open a URL with a caller supplied client
    ///
    /// Issues the first request immediately so the length is known before
    /// the engine probes the stream.
    pub fn with_client(client: Client, url: impl Into<String>) -> Result<Self> {
        let mut source = Self {
            client,
            url: url.into(),
            response: None,
            position: 0,
            length: None,
            at_end: false,
        };
        source.request_from(0)?;
        Ok(source)
    }

    fn request_from(&mut self, offset: u64) -> Result<()> {
        debug!(url = %self.url, offset, "Requesting byte range");

        let mut response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-", offset))
            .send()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            self.response = None;
            self.at_end = true;
            return Ok(());
        }
        if !status.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {}",
                status.as_u16(),
                self.url
            )));
        }

        if self.length.is_none() {
            self.length = Self::total_length(&response, status, offset);
        }

        if status == StatusCode::OK && offset > 0 {
            warn!(url = %self.url, offset, "Server ignored range request, skipping bytes");
            let skipped = std::io::copy(&mut (&mut response).take(offset), &mut std::io::sink())?;
            if skipped < offset {
                self.at_end = true;
            }
        }

        self.response = Some(response);
        Ok(())
    }

    fn total_length(response: &Response, status: StatusCode, offset: u64) -> Option<u64> {
        if status == StatusCode::PARTIAL_CONTENT {
            return response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total);
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(|len| if status == StatusCode::OK { len } else { len + offset })
    }
}

/// Extract the complete length from a `Content-Range` header value
/// (`bytes 0-1023/4096`). `*` means unknown.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

impl ByteSource for HttpRangeSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.at_end {
            return Ok(0);
        }
        if self.response.is_none() {
            self.request_from(self.position)?;
        }

        let n = match self.response.as_mut() {
            Some(response) => response.read(buf)?,
            None => 0,
        };
        self.position += n as u64;
        if n == 0 {
            self.at_end = true;
            self.response = None;
        }
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = resolve_seek(pos, self.position, self.length)?;
        if target != self.position || self.response.is_none() {
            self.response = None;
            self.position = target;
            self.at_end = self.length.is_some_and(|len| target >= len);
        }
        Ok(self.position)
    }

    fn length(&self) -> Option<u64> {
        self.length
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn close(&mut self) -> Result<()> {
        self.response = None;
        Ok(())
    }

    fn description(&self) -> String {
        self.url.clone()
    }
}
