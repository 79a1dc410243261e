// ABOUTME: Connection settings for the caller side of StreamingService.
// ABOUTME: Parses the server address, applies TLS and HTTP/2 keep-alive, and opens the tonic channel.

use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::StreamError;

/// Default server address for client commands.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:50051";

/// Default interval between HTTP/2 keep-alive pings.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// How long a keep-alive ping may go unanswered before the connection is dropped.
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default limit on establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to connect.
///
/// The address is kept without its scheme; [`ChannelConfig::uri`] rebuilds it
/// from the TLS setting so the two cannot disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// `host:port` of the server.
    pub authority: String,
    /// Connect over TLS.
    pub tls: bool,
    /// Ping interval for idle streams. None disables keep-alive.
    pub keep_alive: Option<Duration>,
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    /// Parse `address`, which may be `host:port`, `http://host:port` or
    /// `https://host:port`. An `https` scheme turns TLS on.
    pub fn new(address: impl AsRef<str>) -> Self {
        let address = address.as_ref().trim();
        let (tls, authority) = match address.split_once("://") {
            Some((scheme, rest)) => (scheme.eq_ignore_ascii_case("https"), rest),
            None => (false, address),
        };
        Self {
            authority: authority.trim_end_matches('/').to_string(),
            tls,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Full URI with the scheme implied by [`ChannelConfig::tls`].
    pub fn uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.authority)
    }

    /// Build the tonic endpoint without connecting.
    pub fn endpoint(&self) -> Result<Endpoint, StreamError> {
        if self.authority.is_empty() {
            return Err(StreamError::InvalidArgument(
                "server address is empty".to_string(),
            ));
        }
        let mut endpoint = Endpoint::from_shared(self.uri())
            .map_err(|e| StreamError::InvalidArgument(format!("invalid server address: {e}")))?
            .connect_timeout(self.connect_timeout);

        if self.tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| StreamError::TransportFailure(format!("TLS config error: {e}")))?;
        }

        // Ticks and chat turns can be far apart.
        if let Some(interval) = self.keep_alive {
            endpoint = endpoint
                .http2_keep_alive_interval(interval)
                .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
                .keep_alive_while_idle(true);
        }
        Ok(endpoint)
    }

    /// Open the channel.
    pub async fn connect(&self) -> Result<Channel, StreamError> {
        let channel = self
            .endpoint()?
            .connect()
            .await
            .map_err(|e| StreamError::TransportFailure(e.to_string()))?;

        tracing::debug!(
            uri = %self.uri(),
            tls = self.tls,
            keep_alive_ms = self.keep_alive.map(|d| d.as_millis() as u64),
            "gRPC channel connected"
        );
        Ok(channel)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_server() {
        let config = ChannelConfig::default();
        assert_eq!(config.authority, "127.0.0.1:50051");
        assert_eq!(config.uri(), DEFAULT_SERVER);
        assert!(!config.tls);
        assert_eq!(config.keep_alive, Some(DEFAULT_KEEP_ALIVE));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_address_forms() {
        let bare = ChannelConfig::new(" localhost:50051 ");
        assert_eq!(bare.uri(), "http://localhost:50051");
        assert!(!bare.tls);

        let secure = ChannelConfig::new("HTTPS://streams.example.com/");
        assert!(secure.tls);
        assert_eq!(secure.uri(), "https://streams.example.com");
    }

    #[test]
    fn test_tls_flag_rewrites_scheme() {
        let config = ChannelConfig::new("http://streams.example.com").with_tls(true);
        assert_eq!(config.uri(), "https://streams.example.com");

        let config = ChannelConfig::new("https://streams.example.com").with_tls(false);
        assert_eq!(config.uri(), "http://streams.example.com");
    }

    #[test]
    fn test_endpoint_settings() {
        let config = ChannelConfig::new("localhost:50051")
            .with_keep_alive(None)
            .with_connect_timeout(Duration::from_secs(3));
        assert_eq!(config.keep_alive, None);
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.uri().host(), Some("localhost"));
        assert_eq!(endpoint.uri().port_u16(), Some(50051));
    }

    #[tokio::test]
    async fn test_tls_endpoint_builds() {
        let config = ChannelConfig::new("streams.example.com:443").with_tls(true);
        assert!(config.endpoint().is_ok());
    }

    #[tokio::test]
    async fn test_empty_address_is_invalid() {
        let err = ChannelConfig::new("").connect().await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let config = ChannelConfig::new("http://127.0.0.1:1")
            .with_connect_timeout(Duration::from_millis(100));
        assert!(matches!(
            config.connect().await.unwrap_err(),
            StreamError::TransportFailure(_)
        ));
    }
}
