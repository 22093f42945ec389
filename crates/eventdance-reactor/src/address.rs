//! Address parsing per `spec.md` §6: a filesystem path denotes a UNIX
//! domain socket, `host:port` denotes TCP with `host` resolved as IPv4,
//! IPv6, or a DNS name.

use eventdance_core::error::{codes, CoreError, ErrorCategory};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl EndpointAddr {
    /// A bare string is a filesystem path (contains `/` or has no
    /// parseable port) or `host:port`. This mirrors EventDance's
    /// original `evd_address_resolve` heuristic: try `host:port` first,
    /// fall back to treating the whole string as a UNIX socket path.
    pub fn resolve(address: &str) -> Result<Self, CoreError> {
        if let Some((host, port)) = split_host_port(address) {
            let candidate = format!("{host}:{port}");
            match candidate.to_socket_addrs() {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        return Ok(EndpointAddr::Tcp(addr));
                    }
                }
                Err(_) => { /* fall through to UNIX path interpretation */ }
            }
        }
        Ok(EndpointAddr::Unix(PathBuf::from(address)))
    }

    pub fn expect_resolved_or_err(self) -> Result<Self, CoreError> {
        match &self {
            EndpointAddr::Tcp(_) => Ok(self),
            EndpointAddr::Unix(path) if path.exists() || path.parent().is_some() => Ok(self),
            EndpointAddr::Unix(_) => Err(CoreError::new(
                codes::SOCKET_RESOLVE_FAILED,
                "address did not resolve to a TCP endpoint or usable path",
            )
            .with_category(ErrorCategory::Resource)),
        }
    }
}

/// Splits `host:port` only when the trailing segment after the last
/// colon parses as a `u16` — this lets IPv6 literals without brackets
/// (which contain many colons but no trailing port) and filesystem
/// paths containing colons fall through to UNIX-path handling.
fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_host_port_resolves_to_tcp() {
        let resolved = EndpointAddr::resolve("127.0.0.1:8080").unwrap();
        assert!(matches!(resolved, EndpointAddr::Tcp(_)));
    }

    #[test]
    fn bare_path_resolves_to_unix() {
        let resolved = EndpointAddr::resolve("/tmp/eventdance.sock").unwrap();
        assert_eq!(
            resolved,
            EndpointAddr::Unix(PathBuf::from("/tmp/eventdance.sock"))
        );
    }
}
