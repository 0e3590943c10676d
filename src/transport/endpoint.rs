use crate::error::TransportError;
use async_tungstenite::tungstenite::http::Uri;
use std::fmt;

/// Parsed consumer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    host: String,
    port: u16,
    secure: bool,
}

impl Endpoint {
    /// Parse a `ws://host:port[/path]` or `wss://` address.
    ///
    /// Failures are operator errors and must not be retried.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |details: &str| TransportError::InvalidEndpoint {
            endpoint: url.to_string(),
            details: details.to_string(),
        };

        let trimmed = url.trim();
        let uri: Uri = trimmed
            .parse()
            .map_err(|e: async_tungstenite::tungstenite::http::uri::InvalidUri| {
                invalid(&e.to_string())
            })?;

        let secure = match uri.scheme_str() {
            Some("ws") => false,
            Some("wss") => true,
            Some(other) => return Err(invalid(&format!("unsupported scheme '{}'", other))),
            None => return Err(invalid("missing scheme")),
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        // Parsed by hand: Uri::port_u16 hides out-of-range ports
        let host_port = uri
            .authority()
            .and_then(|a| a.as_str().rsplit('@').next())
            .unwrap_or_default();
        let explicit_port = host_port
            .rsplit_once(':')
            .map(|(_, p)| p)
            .filter(|p| !p.contains(']'));
        let port = match explicit_port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None if secure => 443,
            None => 80,
        };
        if port == 0 {
            return Err(invalid("port must be greater than 0"));
        }

        Ok(Self {
            url: trimmed.to_string(),
            host,
            port,
            secure,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ws_endpoint() {
        let endpoint = Endpoint::parse("ws://10.0.0.5:8080").unwrap();
        assert_eq!(endpoint.host(), "10.0.0.5");
        assert_eq!(endpoint.port(), 8080);
        assert!(!endpoint.is_secure());
        assert_eq!(endpoint.to_string(), "ws://10.0.0.5:8080");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Endpoint::parse("ws://example.com/stream").unwrap().port(), 80);
        assert_eq!(Endpoint::parse("wss://example.com").unwrap().port(), 443);
    }

    #[test]
    fn test_invalid_endpoints() {
        for url in ["", "localhost:8080", "http://localhost:8080", "ws://", "ws://host:99999"] {
            let err = Endpoint::parse(url).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{} should be rejected",
                url
            );
            assert!(!err.is_recoverable());
        }
    }
}
