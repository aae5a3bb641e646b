//! CGI request environment.
//!
//! A module sees the HTTP request only through its stdin (the body) and a
//! fixed pair of environment variables describing the request line.

use axum::http::{Method, Version};

/// Name of the variable carrying the request method.
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";

/// Name of the variable carrying the protocol version.
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";

/// The request-line facts handed to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiRequest {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Protocol as written on the request line, e.g. `HTTP/1.1`.
    pub protocol: String,
}

impl CgiRequest {
    /// Describe a request by its method and version.
    pub fn new(method: &Method, version: Version) -> Self {
        Self {
            method: method.as_str().to_string(),
            protocol: protocol_name(version).to_string(),
        }
    }

    /// The module environment, in a stable order.
    pub fn into_env(self) -> Vec<(String, String)> {
        vec![
            (REQUEST_METHOD.to_string(), self.method),
            (SERVER_PROTOCOL.to_string(), self.protocol),
        ]
    }
}

/// Protocol string for an HTTP version (`HTTP/<major>.<minor>`).
pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_http11() {
        let req = CgiRequest::new(&Method::GET, Version::HTTP_11);
        assert_eq!(req.method, "GET");
        assert_eq!(req.protocol, "HTTP/1.1");
    }

    #[test]
    fn test_into_env_order() {
        let env = CgiRequest::new(&Method::GET, Version::HTTP_10).into_env();
        assert_eq!(
            env,
            vec![
                ("REQUEST_METHOD".to_string(), "GET".to_string()),
                ("SERVER_PROTOCOL".to_string(), "HTTP/1.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(protocol_name(Version::HTTP_09), "HTTP/0.9");
        assert_eq!(protocol_name(Version::HTTP_2), "HTTP/2.0");
        assert_eq!(protocol_name(Version::HTTP_3), "HTTP/3.0");
    }
}
