//! Image download for the worker.
//!
//! One attempt, bounded by a timeout. Unless private hosts are allowed, the
//! target host is resolved up front, every address must be public, and the
//! request is pinned to the checked address so a second DNS answer cannot
//! redirect it inside the network.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Response content types accepted as images.
const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

const USER_AGENT: &str = concat!("agri-diagnose/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher with size, type, and address checks.
pub struct HttpImageFetcher {
    timeout: Duration,
    max_bytes: usize,
    allow_private_hosts: bool,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: usize, allow_private_hosts: bool) -> Self {
        Self {
            timeout,
            max_bytes,
            allow_private_hosts,
        }
    }

    /// Validate the URL and return a client pinned to a vetted address.
    async fn prepare(&self, url: &str) -> Result<(Url, reqwest::Client), FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        let port = parsed.port_or_known_default().unwrap_or(80);

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none());

        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl("missing host".to_string()))?;

        if !self.allow_private_hosts {
            let bare = host.trim_start_matches('[').trim_end_matches(']');
            match bare.parse::<IpAddr>() {
                Ok(ip) => ensure_public(ip)?,
                Err(_) => {
                    let addr = resolve_public(host, port).await?;
                    builder = builder.resolve(host, addr);
                }
            }
        }

        let client = builder.build().map_err(|e| FetchError::Network(e.to_string()))?;
        Ok((parsed, client))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (parsed, client) = self.prepare(url).await?;

        let mut response = client.get(parsed).send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(len) = declared {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
        }

        tracing::debug!(
            host = %response.url().host_str().unwrap_or_default(),
            bytes = body.len(),
            content_type = %content_type,
            "Image downloaded"
        );
        Ok(body)
    }
}

impl HttpImageFetcher {
    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

async fn resolve_public(host: &str, port: u16) -> Result<SocketAddr, FetchError> {
    if matches!(host.to_ascii_lowercase().as_str(), "localhost" | "localhost.") {
        return Err(FetchError::Blocked(format!("{host} is a loopback host")));
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| FetchError::Network(format!("DNS lookup for {host} failed: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(FetchError::Network(format!("{host} did not resolve")));
    }
    if let Some(bad) = addrs.iter().find(|a| !is_public_ip(a.ip())) {
        return Err(FetchError::Blocked(format!("{host} resolves to {}", bad.ip())));
    }
    Ok(addrs[0])
}

fn ensure_public(ip: IpAddr) -> Result<(), FetchError> {
    if is_public_ip(ip) {
        Ok(())
    } else {
        Err(FetchError::Blocked(format!("{ip} is not a public address")))
    }
}

/// True for globally routable unicast addresses.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    let reserved = a >= 240;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        || shared
        || reserved
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("image download failed: invalid URL: {0}")]
    InvalidUrl(String),

    #[error("image download blocked: {0}")]
    Blocked(String),

    #[error("image download timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("image download failed: {0}")]
    Network(String),

    #[error("image download failed: HTTP {0}")]
    Status(u16),

    #[error("image download rejected: unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("image download rejected: larger than {0} bytes")]
    TooLarge(usize),
}
