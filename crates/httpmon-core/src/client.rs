use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

/// Build the shared HTTP client. One instance is cloned into every runner so
/// the connection pool is shared across monitors.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(20)
        .gzip(true)
        .build()
}

/// A fully buffered HTTP response.
///
/// The body is read once off the wire; extraction rules borrow it as often
/// as they need.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProbeResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header value. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// All values of a header, in received order. Lookup is case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return Vec::new();
        };
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_values_keep_order_and_ignore_case() {
        let resp = ProbeResponse::new(200)
            .with_header("Set-Cookie", "a=1")
            .with_header("set-cookie", "b=2");
        assert_eq!(resp.header_values("SET-COOKIE"), vec!["a=1", "b=2"]);
        assert!(resp.header_values("bad header").is_empty());
    }

    #[test]
    fn builds_shared_client() {
        assert!(build_client(Duration::from_secs(29)).is_ok());
    }
}
