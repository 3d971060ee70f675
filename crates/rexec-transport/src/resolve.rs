use std::net::{IpAddr, Ipv4Addr};

use rexec_core::EngineError;

/// Resolve `host` to an IPv4 address, taking only the first address
/// the resolver returns.
///
/// Taking only the first address rather than searching the full list
/// or round-robining across it is a deliberate choice, not a
/// limitation: it keeps repeated runs deterministic and keeps this
/// function from silently masking a misconfigured AAAA record by
/// falling back past it.
pub async fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, EngineError> {
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|_| EngineError::HostResolution(host.to_string()))?;

    let first = addrs
        .next()
        .ok_or_else(|| EngineError::HostResolution(host.to_string()))?;

    match first.ip() {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(_) => Err(EngineError::NonIpv4Address(host.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn localhost_resolves_to_ipv4() {
        let addr = resolve_ipv4("localhost").await.unwrap();
        assert_eq!(addr, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn bogus_host_is_fatal() {
        let err = resolve_ipv4("this-host-does-not-exist.invalid").await;
        assert!(err.is_err());
    }
}
