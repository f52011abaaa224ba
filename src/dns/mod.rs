//! Resolved-name cache with rebinding defense.
//!
//! The coordinator records what each host resolved to and, on the
//! failure classes that betray a rebinding attempt, either evicts the
//! entry (connection refused, service unavailable: resolve fresh next
//! time) or poisons it in place (unknown host: keep the mapping visible
//! but unusable, so a flip-flopping name cannot revive a stale address).
//!
//! Modeled after NoScript's `DNS` helper; resolution itself stays in the
//! embedding network stack.

use dashmap::DashMap;
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Default lifetime of a recorded mapping.
pub const DEFAULT_TTL: Duration = Duration::seconds(120);

/// One cached resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsEntry {
    pub addrs: Vec<IpAddr>,
    pub expires: OffsetDateTime,
    pub invalid: bool,
}

impl DnsEntry {
    /// Invalidated entries report expired regardless of their deadline.
    pub fn is_expired(&self) -> bool {
        self.invalid || OffsetDateTime::now_utc() > self.expires
    }
}

/// Host-keyed cache of recent resolutions.
#[derive(Debug, Default)]
pub struct DnsCache {
    entries: DashMap<String, DnsEntry>,
}

impl DnsCache {
    pub fn new() -> Self {
        DnsCache::default()
    }

    pub fn record(&self, host: &str, addrs: Vec<IpAddr>, ttl: Duration) {
        self.entries.insert(
            host.to_lowercase(),
            DnsEntry {
                addrs,
                expires: OffsetDateTime::now_utc() + ttl,
                invalid: false,
            },
        );
    }

    /// Returns the entry for `host` even when expired; callers check
    /// [`DnsEntry::is_expired`] themselves.
    pub fn cached(&self, host: &str) -> Option<DnsEntry> {
        self.entries
            .get(&host.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// Drops the entry for `host`.
    pub fn evict(&self, host: &str) -> bool {
        let evicted = self.entries.remove(&host.to_lowercase()).is_some();
        if evicted {
            debug!(host = %host, "dns entry evicted");
        }
        evicted
    }

    /// Keeps the entry for `host` but marks it unusable.
    pub fn invalidate(&self, host: &str) -> bool {
        match self.entries.get_mut(&host.to_lowercase()) {
            Some(mut entry) => {
                entry.invalid = true;
                debug!(host = %host, "dns entry invalidated");
                true
            }
            None => false,
        }
    }

    /// True for IPv4/IPv6 literals, which never need cache bookkeeping.
    pub fn is_ip(host: &str) -> bool {
        let bare = host
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(host);
        bare.parse::<IpAddr>().is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::from([a, b, c, d])
    }

    #[test]
    fn test_record_and_lookup() {
        let cache = DnsCache::new();
        cache.record("Example.COM", vec![v4(93, 184, 216, 34)], DEFAULT_TTL);

        let entry = cache.cached("example.com").unwrap();
        assert_eq!(entry.addrs, vec![v4(93, 184, 216, 34)]);
        assert!(!entry.is_expired());
        assert!(cache.cached("other.example").is_none());
    }

    #[test]
    fn test_evict_removes_entry() {
        let cache = DnsCache::new();
        cache.record("example.com", vec![v4(10, 0, 0, 1)], DEFAULT_TTL);

        assert!(cache.evict("example.com"));
        assert!(cache.cached("example.com").is_none());
        assert!(!cache.evict("example.com"));
    }

    #[test]
    fn test_invalidate_keeps_entry_but_expires_it() {
        let cache = DnsCache::new();
        cache.record("example.com", vec![v4(10, 0, 0, 1)], DEFAULT_TTL);

        assert!(cache.invalidate("example.com"));
        let entry = cache.cached("example.com").unwrap();
        assert!(entry.invalid);
        assert!(entry.is_expired());
        assert_eq!(entry.addrs, vec![v4(10, 0, 0, 1)]);

        assert!(!cache.invalidate("never-seen.example"));
    }

    #[test]
    fn test_negative_ttl_expires_immediately() {
        let cache = DnsCache::new();
        cache.record("example.com", vec![v4(10, 0, 0, 1)], Duration::seconds(-1));
        assert!(cache.cached("example.com").unwrap().is_expired());
    }

    #[test]
    fn test_ip_literal_probe() {
        assert!(DnsCache::is_ip("192.168.1.1"));
        assert!(DnsCache::is_ip("::1"));
        assert!(DnsCache::is_ip("[2001:db8::1]"));
        assert!(!DnsCache::is_ip("example.com"));
        assert!(!DnsCache::is_ip("192.168.1"));
    }
}
