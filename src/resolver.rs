//! Remote host resolution with a deadline
//!
//! Literal IPv4/IPv6 addresses are returned as-is. Names get exactly one
//! lookup raced against a timer; whichever finishes first wins and the other
//! is dropped. Retries are the caller's business.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, ResolveFailure};

/// Lookup deadline used when the configuration does not override it
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of resolving a host string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAddress {
    /// Input was already an IP address, no lookup performed
    Literal(IpAddr),
    /// Name lookup produced this address
    Resolved(IpAddr),
    /// Name lookup failed, found nothing, or timed out
    Unresolved(ResolveFailure),
}

impl ResolvedAddress {
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            ResolvedAddress::Literal(ip) | ResolvedAddress::Resolved(ip) => Some(*ip),
            ResolvedAddress::Unresolved(_) => None,
        }
    }

    /// Turn the outcome into the address or a [`BridgeError::HostUnresolvable`]
    pub fn into_result(self, host: &str) -> Result<IpAddr, BridgeError> {
        match self {
            ResolvedAddress::Literal(ip) | ResolvedAddress::Resolved(ip) => Ok(ip),
            ResolvedAddress::Unresolved(reason) => Err(BridgeError::HostUnresolvable {
                host: host.to_string(),
                reason,
            }),
        }
    }
}

/// Name resolution backend
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// Issue one query for `host` and return every address in the answer
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// System resolver (getaddrinfo on tokio's blocking pool)
pub struct SystemLookup;

#[async_trait]
impl NameLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolves remote host strings for the connection controller
#[derive(Clone)]
pub struct HostResolver {
    lookup: Arc<dyn NameLookup>,
    timeout: Duration,
}

impl HostResolver {
    pub fn new(lookup: Arc<dyn NameLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// Resolver backed by the operating system
    pub fn system(timeout: Duration) -> Self {
        Self::new(Arc::new(SystemLookup), timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `host` to a single address
    pub async fn resolve(&self, host: &str) -> ResolvedAddress {
        let host = host.trim();

        if let Some(ip) = parse_literal(host) {
            debug!("'{}' is a literal address, skipping lookup", host);
            return ResolvedAddress::Literal(ip);
        }

        // Dropping the lookup future on timeout discards its answer
        match tokio::time::timeout(self.timeout, self.lookup.lookup(host)).await {
            Err(_) => {
                error!("DNS lookup for '{}' timed out after {:?}", host, self.timeout);
                ResolvedAddress::Unresolved(ResolveFailure::TimedOut(self.timeout))
            },
            Ok(Err(e)) => {
                error!("Error resolving host '{}': {}", host, e);
                ResolvedAddress::Unresolved(ResolveFailure::LookupFailed(e.to_string()))
            },
            Ok(Ok(addrs)) => match addrs.first() {
                Some(ip) => {
                    info!("Resolved host '{}' to {}", host, ip);
                    ResolvedAddress::Resolved(*ip)
                },
                None => {
                    warn!("Could not resolve host '{}': empty answer", host);
                    ResolvedAddress::Unresolved(ResolveFailure::NoAddress)
                },
            },
        }
    }
}

/// Parse an IPv4/IPv6 literal, accepting bracketed IPv6 (`[::1]`)
fn parse_literal(host: &str) -> Option<IpAddr> {
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    unbracketed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted lookup that counts queries
    struct FakeLookup {
        answer: io::Result<Vec<IpAddr>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeLookup {
        fn answering(answer: io::Result<Vec<IpAddr>>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(vec![]),
                delay: Some(Duration::from_secs(3600)),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NameLookup for FakeLookup {
        async fn lookup(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.answer {
                Ok(addrs) => Ok(addrs.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_literal_ips_skip_lookup() {
        let lookup = FakeLookup::hanging();
        let resolver = HostResolver::new(lookup.clone(), DEFAULT_RESOLVE_TIMEOUT);

        assert_eq!(
            resolver.resolve("10.0.0.5").await,
            ResolvedAddress::Literal(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        );
        assert_eq!(
            resolver.resolve("::1").await,
            ResolvedAddress::Literal(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
        assert_eq!(
            resolver.resolve("[fe80::1]").await.address(),
            Some("fe80::1".parse().unwrap())
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_name_resolves_to_first_address() {
        let lookup = FakeLookup::answering(Ok(vec![
            "192.168.1.20".parse().unwrap(),
            "192.168.1.21".parse().unwrap(),
        ]));
        let resolver = HostResolver::new(lookup.clone(), DEFAULT_RESOLVE_TIMEOUT);

        let resolved = resolver.resolve("zynthian.local").await;
        assert_eq!(resolved, ResolvedAddress::Resolved("192.168.1.20".parse().unwrap()));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_answer_is_no_address() {
        let resolver = HostResolver::new(FakeLookup::answering(Ok(vec![])), DEFAULT_RESOLVE_TIMEOUT);
        assert_eq!(
            resolver.resolve("nothing.local").await,
            ResolvedAddress::Unresolved(ResolveFailure::NoAddress)
        );
    }

    #[tokio::test]
    async fn test_lookup_error_is_reported() {
        let lookup = FakeLookup::answering(Err(io::Error::new(io::ErrorKind::Other, "NXDOMAIN")));
        let resolver = HostResolver::new(lookup, DEFAULT_RESOLVE_TIMEOUT);

        match resolver.resolve("doesnotresolve.invalid").await {
            ResolvedAddress::Unresolved(ResolveFailure::LookupFailed(msg)) => {
                assert!(msg.contains("NXDOMAIN"))
            },
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_deadline() {
        let lookup = FakeLookup::hanging();
        let resolver = HostResolver::new(lookup.clone(), DEFAULT_RESOLVE_TIMEOUT);

        let started = tokio::time::Instant::now();
        let resolved = resolver.resolve("doesnotresolve.invalid").await;
        let elapsed = started.elapsed();

        assert_eq!(
            resolved,
            ResolvedAddress::Unresolved(ResolveFailure::TimedOut(DEFAULT_RESOLVE_TIMEOUT))
        );
        assert!(elapsed >= DEFAULT_RESOLVE_TIMEOUT);
        assert!(elapsed < DEFAULT_RESOLVE_TIMEOUT + Duration::from_millis(50));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_result() {
        let err = ResolvedAddress::Unresolved(ResolveFailure::NoAddress)
            .into_result("studio.local")
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::HostUnresolvable {
                host: "studio.local".into(),
                reason: ResolveFailure::NoAddress,
            }
        );
    }
}
