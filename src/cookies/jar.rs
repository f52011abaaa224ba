use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use url::Url;

use crate::cookies::record::TrackedCookie;

/// In-process view of the embedder's cookie store.
///
/// Keyed by dot-stripped host. The guard persists secure-flag toggles
/// here and probes it for historical secure cookies; the embedder is
/// expected to keep it in sync with whatever real store it owns.
#[derive(Clone, Default)]
pub struct CookieJar {
    store: Arc<DashMap<String, Vec<TrackedCookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(cookie: &TrackedCookie) -> String {
        cookie.raw_host.clone()
    }

    /// Inserts or replaces a cookie with the same name/host/path.
    pub fn save(&self, cookie: &TrackedCookie) {
        let mut entry = self.store.entry(Self::key(cookie)).or_default();
        entry.retain(|c| !c.same_identity(cookie));
        entry.push(cookie.clone());
    }

    pub fn exists(&self, cookie: &TrackedCookie) -> bool {
        self.store
            .get(&Self::key(cookie))
            .map(|e| e.iter().any(|c| c.same_identity(cookie)))
            .unwrap_or(false)
    }

    pub fn get(&self, cookie: &TrackedCookie) -> Option<TrackedCookie> {
        self.store
            .get(&Self::key(cookie))
            .and_then(|e| e.iter().find(|c| c.same_identity(cookie)).cloned())
    }

    pub fn remove(&self, cookie: &TrackedCookie) -> bool {
        let removed = match self.store.get_mut(&Self::key(cookie)) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|c| !c.same_identity(cookie));
                before != entry.len()
            }
            None => false,
        };
        self.store
            .remove_if(&cookie.raw_host, |_, v| v.is_empty());
        removed
    }

    /// Host itself plus every parent domain a cookie could be keyed on.
    fn matching_domains(host: &str) -> Vec<String> {
        let host = host.trim_start_matches('.').to_ascii_lowercase();
        let mut domains = vec![host.clone()];
        let mut rest = host.as_str();
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if rest.contains('.') {
                domains.push(rest.to_owned());
            }
        }
        domains
    }

    /// First stored cookie for `host` satisfying the predicate.
    pub fn find<F>(&self, host: &str, pred: F) -> Option<TrackedCookie>
    where
        F: Fn(&TrackedCookie) -> bool,
    {
        for domain in Self::matching_domains(host) {
            if let Some(entry) = self.store.get(&domain) {
                if let Some(c) = entry.iter().find(|c| c.belongs_to(host) && pred(c)) {
                    return Some(c.clone());
                }
            }
        }
        None
    }

    /// Cookies that would be sent to `host`/`path`, honoring the
    /// Secure attribute against the transport.
    pub fn cookies_for(&self, host: &str, path: &str, secure_transport: bool) -> Vec<TrackedCookie> {
        let now = OffsetDateTime::now_utc();
        let mut result = Vec::new();
        for domain in Self::matching_domains(host) {
            if let Some(entry) = self.store.get(&domain) {
                for c in entry.iter() {
                    if !c.belongs_to_path(host, path) {
                        continue;
                    }
                    if c.secure && !secure_transport {
                        continue;
                    }
                    if c.is_expired(now) {
                        continue;
                    }
                    result.push(c.clone());
                }
            }
        }
        // longest path first, then name for determinism
        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.name.cmp(&b.name))
        });
        result
    }

    /// The `Cookie` header value the store would produce for a URL.
    pub fn cookie_header_for(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let cookies = self.cookies_for(host, url.path(), url.scheme() == "https");
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(TrackedCookie::cookie_pair)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn len(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}
