//! Strict-transport store: hosts that must only be reached over HTTPS.
//!
//! Modeled after NoScript's `STS` module, which predated the browsers'
//! native HSTS support: a host-keyed table fed by
//! `Strict-Transport-Security` response headers, with a small built-in
//! seed of known HTTPS-only sites.

use dashmap::DashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// One strict-transport grant for a host.
#[derive(Debug, Clone)]
pub struct StsEntry {
    /// Whether subdomains inherit the grant.
    pub include_subdomains: bool,
    /// When the grant lapses (`None` = seeded, never expires).
    pub expires: Option<OffsetDateTime>,
}

impl StsEntry {
    pub fn new(include_subdomains: bool, max_age_secs: u64) -> Self {
        StsEntry {
            include_subdomains,
            expires: Some(OffsetDateTime::now_utc() + Duration::seconds(max_age_secs as i64)),
        }
    }

    pub fn seeded(include_subdomains: bool) -> Self {
        StsEntry {
            include_subdomains,
            expires: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(expires) => OffsetDateTime::now_utc() > expires,
            None => false,
        }
    }
}

/// Host-keyed strict-transport table, shared across the engine.
#[derive(Clone, Default)]
pub struct StsStore {
    entries: Arc<DashMap<String, StsEntry>>,
}

impl StsStore {
    pub fn new() -> Self {
        StsStore::default()
    }

    /// A store seeded with sites that were HTTPS-only before dynamic
    /// strict-transport headers existed.
    pub fn with_seed() -> Self {
        let store = StsStore::new();
        let seeded = [
            ("paypal.com", true),
            ("www.paypal.com", true),
            ("lastpass.com", true),
            ("accounts.google.com", true),
            ("github.com", true),
        ];
        for (host, include_subdomains) in seeded {
            store.seed(host, include_subdomains);
        }
        store
    }

    pub fn seed(&self, host: &str, include_subdomains: bool) {
        self.entries
            .insert(host.to_lowercase(), StsEntry::seeded(include_subdomains));
    }

    /// True when `host` (or a subdomain-covering parent) holds an
    /// unexpired grant.
    pub fn is_sts_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();

        if let Some(entry) = self.entries.get(&host) {
            if !entry.is_expired() {
                return true;
            }
        }

        let labels: Vec<&str> = host.split('.').collect();
        for i in 1..labels.len() {
            let parent = labels[i..].join(".");
            if let Some(entry) = self.entries.get(&parent) {
                if !entry.is_expired() && entry.include_subdomains {
                    return true;
                }
            }
        }

        false
    }

    /// Parses one `Strict-Transport-Security` header value for `host`.
    ///
    /// `max-age=0` revokes the grant; a missing `max-age` directive makes
    /// the whole header a no-op. Callers must only feed headers received
    /// over a secure channel.
    pub fn add_from_header(&self, host: &str, header: &str) {
        let mut max_age: Option<u64> = None;
        let mut include_subdomains = false;

        for directive in header.split(';') {
            let directive = directive.trim().to_lowercase();
            if let Some(age) = directive.strip_prefix("max-age=") {
                if let Ok(secs) = age.trim_matches('"').parse::<u64>() {
                    max_age = Some(secs);
                }
            } else if directive == "includesubdomains" {
                include_subdomains = true;
            }
        }

        let Some(secs) = max_age else { return };
        let host_key = host.to_lowercase();
        if secs == 0 {
            if self.entries.remove(&host_key).is_some() {
                debug!(host = %host_key, "strict-transport grant revoked");
            }
        } else {
            debug!(
                host = %host_key,
                max_age = secs,
                include_subdomains,
                "strict-transport grant recorded"
            );
            self.entries
                .insert(host_key, StsEntry::new(include_subdomains, secs));
        }
    }

    pub fn remove(&self, host: &str) -> bool {
        self.entries.remove(&host.to_lowercase()).is_some()
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

    #[test]
    fn test_exact_host_grant() {
        let store = StsStore::new();
        store.seed("bank.example", false);

        assert!(store.is_sts_host("bank.example"));
        assert!(store.is_sts_host("BANK.EXAMPLE"));
        assert!(!store.is_sts_host("login.bank.example"));
    }

    #[test]
    fn test_subdomain_walk() {
        let store = StsStore::new();
        store.seed("bank.example", true);

        assert!(store.is_sts_host("bank.example"));
        assert!(store.is_sts_host("login.bank.example"));
        assert!(store.is_sts_host("a.b.bank.example"));
        assert!(!store.is_sts_host("otherbank.example"));
    }

    #[test]
    fn test_header_with_and_without_subdomains() {
        let store = StsStore::new();
        store.add_from_header("bank.example", "max-age=31536000; includeSubDomains");
        assert!(store.is_sts_host("login.bank.example"));

        store.add_from_header("shop.example", "max-age=31536000");
        assert!(store.is_sts_host("shop.example"));
        assert!(!store.is_sts_host("cdn.shop.example"));
    }

    #[test]
    fn test_quoted_max_age() {
        let store = StsStore::new();
        store.add_from_header("bank.example", "max-age=\"600\"");
        assert!(store.is_sts_host("bank.example"));
    }

    #[test]
    fn test_max_age_zero_revokes() {
        let store = StsStore::new();
        store.seed("bank.example", true);
        store.add_from_header("bank.example", "max-age=0");
        assert!(!store.is_sts_host("bank.example"));
    }

    #[test]
    fn test_header_without_max_age_is_noop() {
        let store = StsStore::new();
        store.add_from_header("bank.example", "includeSubDomains");
        assert!(!store.is_sts_host("bank.example"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_seeded_store() {
        let store = StsStore::with_seed();
        assert!(store.is_sts_host("paypal.com"));
        assert!(store.is_sts_host("checkout.paypal.com"));
        assert!(!store.is_sts_host("example.com"));
    }
}
