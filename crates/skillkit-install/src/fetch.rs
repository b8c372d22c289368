//! Guarded network fetch.
//!
//! [`Fetcher`] is the only way the installer touches the network.  The
//! default [`GuardedFetcher`] refuses non-HTTP(S) schemes and destinations
//! that resolve to private, loopback or link-local addresses, and follows
//! redirects by hand so every hop passes the same check before it is
//! requested.
//!
//! A [`FetchResponse`] owns its body stream; dropping it releases the
//! underlying connection on every path.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Maximum number of redirects followed.
const MAX_REDIRECTS: usize = 5;

const USER_AGENT: &str = concat!("skillkit/", env!("CARGO_PKG_VERSION"));

/// Streaming response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Response of a guarded fetch.
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status line text, e.g. `404 Not Found`.
    pub status_text: String,
    /// Body, if the response carries one.
    pub body: Option<BodyStream>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Network access for downloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by `reqwest` with an SSRF guard.
pub struct GuardedFetcher {
    /// Client with automatic redirects disabled, or why it could not be built.
    client: Result<reqwest::Client, String>,
    allow_private: bool,
}

impl GuardedFetcher {
    /// Create a fetcher that blocks private destinations.
    ///
    /// If the HTTP client cannot be built every fetch fails with
    /// [`FetchError::ClientUnavailable`].
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                warn!(error = %e, "failed to build HTTP client");
                e.to_string()
            });
        Self {
            client,
            allow_private: false,
        }
    }

    /// Permit loopback and private-network destinations (tests, air-gapped
    /// mirrors).
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }
}

impl Default for GuardedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for GuardedFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let timeout_ms = timeout.as_millis() as u64;
        tokio::time::timeout(timeout, self.fetch_following_redirects(url, timeout))
            .await
            .map_err(|_| FetchError::Timeout(timeout_ms))?
    }
}

impl GuardedFetcher {
    async fn fetch_following_redirects(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let client = self
            .client
            .as_ref()
            .map_err(|reason| FetchError::ClientUnavailable(reason.clone()))?;
        let mut current = parse_url(url)?;

        for hop in 0..=MAX_REDIRECTS {
            check_destination(&current, self.allow_private).await?;
            debug!(url = %current, hop, "fetching");

            let response = client
                .get(current.clone())
                .timeout(timeout)
                .send()
                .await?;

            let status = response.status();
            if status.is_redirection()
                && let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
            {
                current = redirect_target(&current, location)?;
                continue;
            }

            let status_text = match status.canonical_reason() {
                Some(reason) => format!("{} {reason}", status.as_u16()),
                None => status.as_u16().to_string(),
            };
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(FetchError::from))
                .boxed();

            return Ok(FetchResponse {
                status: status.as_u16(),
                status_text,
                body: Some(body),
            });
        }

        Err(FetchError::TooManyRedirects(MAX_REDIRECTS))
    }
}

fn parse_url(url: &str) -> Result<url::Url, FetchError> {
    url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Resolve a `Location` header against the URL that returned it.
fn redirect_target(current: &url::Url, location: &str) -> Result<url::Url, FetchError> {
    current.join(location).map_err(|e| FetchError::InvalidUrl {
        url: location.to_owned(),
        reason: e.to_string(),
    })
}

/// Reject destinations the installer must never reach.
async fn check_destination(url: &url::Url, allow_private: bool) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::Blocked(format!(
                "unsupported scheme `{scheme}`"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| FetchError::Blocked("no host in URL".into()))?;

    if allow_private {
        return Ok(());
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(FetchError::Blocked(format!(
                "{host} is a private IP address"
            )));
        }
        return Ok(());
    }

    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".localhost") {
        return Err(FetchError::Blocked(format!("{host} is a local hostname")));
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| FetchError::Blocked(format!("DNS resolution failed for `{host}`: {e}")))?;

    for addr in addrs {
        if is_private_ip(addr.ip()) {
            return Err(FetchError::Blocked(format!(
                "{host} resolves to private IP {}",
                addr.ip()
            )));
        }
    }

    Ok(())
}

/// Check if an IP address is private, loopback, link-local, or otherwise internal.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // 100.64.0.0/10 (CGNAT / Shared Address Space)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24 (IETF Protocol Assignments)
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_detected() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "192.168.0.10",
            "172.16.5.4",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_private_ip(ip.parse().unwrap()), "{ip} should be private");
        }
        for ip in ["1.1.1.1", "140.82.112.3", "2606:4700::1111"] {
            assert!(!is_private_ip(ip.parse().unwrap()), "{ip} should be public");
        }
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let url = url::Url::parse("file:///etc/passwd").unwrap();
        let err = check_destination(&url, false).await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme `file`"));
    }

    #[tokio::test]
    async fn rejects_loopback_literals_and_localhost() {
        for raw in ["http://127.0.0.1:8080/x", "http://[::1]/x", "http://localhost/x"] {
            let url = url::Url::parse(raw).unwrap();
            assert!(
                matches!(check_destination(&url, false).await, Err(FetchError::Blocked(_))),
                "{raw} should be blocked"
            );
        }
    }

    #[tokio::test]
    async fn allow_private_skips_address_checks_but_not_scheme() {
        let url = url::Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert!(check_destination(&url, true).await.is_ok());

        let ftp = url::Url::parse("ftp://127.0.0.1/x").unwrap();
        assert!(check_destination(&ftp, true).await.is_err());
    }

    #[tokio::test]
    async fn fetcher_blocks_private_targets_before_connecting() {
        let err = GuardedFetcher::new()
            .fetch("http://10.0.0.1/tool.tar.gz", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Blocked(_)));
    }

    #[tokio::test]
    async fn redirect_hops_are_checked_like_the_first_request() {
        let origin = url::Url::parse("https://downloads.example.com/tool/latest").unwrap();

        for location in [
            "http://127.0.0.1/internal",
            "http://169.254.169.254/latest/meta-data/",
            "http://[::1]:8080/",
            "file:///etc/passwd",
        ] {
            let next = redirect_target(&origin, location).unwrap();
            assert!(
                matches!(check_destination(&next, false).await, Err(FetchError::Blocked(_))),
                "{location} should be blocked"
            );
        }

        let relative = redirect_target(&origin, "../v2/tool.zip").unwrap();
        assert_eq!(relative.as_str(), "https://downloads.example.com/v2/tool.zip");
    }

    #[tokio::test]
    async fn unbuildable_client_fails_every_fetch() {
        let fetcher = GuardedFetcher {
            client: Err("no TLS backend".into()),
            allow_private: true,
        };
        let err = fetcher
            .fetch("https://example.com/tool.zip", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, FetchError::ClientUnavailable(reason) if reason == "no TLS backend"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let err = GuardedFetcher::new()
            .fetch("not a url", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
