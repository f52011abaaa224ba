//! HTTPS forcing for request and redirect targets.
//!
//! Modeled after NoScript's `HTTPS.forceURI`: a plaintext target is
//! rewritten to `https` when the forced-pattern list or the
//! strict-transport store names it, unless the exception list carves it
//! out. The coordinator applies this before every decision, so a forced
//! hop is re-validated under its final scheme.

use http::header::STRICT_TRANSPORT_SECURITY;
use http::HeaderMap;
use tracing::{info, warn};
use url::Url;

use crate::https::sts::StsStore;
use crate::sites::AddressMatcher;

pub struct HttpsEnforcer {
    forced: AddressMatcher,
    exceptions: AddressMatcher,
    sts: StsStore,
}

impl Default for HttpsEnforcer {
    fn default() -> Self {
        HttpsEnforcer::new()
    }
}

impl HttpsEnforcer {
    pub fn new() -> Self {
        HttpsEnforcer {
            forced: AddressMatcher::never(),
            exceptions: AddressMatcher::never(),
            sts: StsStore::with_seed(),
        }
    }

    pub fn with_sts(sts: StsStore) -> Self {
        HttpsEnforcer {
            forced: AddressMatcher::never(),
            exceptions: AddressMatcher::never(),
            sts,
        }
    }

    pub fn set_forced(&mut self, forced: AddressMatcher) {
        self.forced = forced;
    }

    pub fn set_exceptions(&mut self, exceptions: AddressMatcher) {
        self.exceptions = exceptions;
    }

    pub fn sts(&self) -> &StsStore {
        &self.sts
    }

    /// True when `url` is plaintext and some rule demands encryption.
    pub fn must_force(&self, url: &Url) -> bool {
        if url.scheme() != "http" {
            return false;
        }
        let spec = url.as_str();
        let demanded = self.forced.test(spec)
            || url
                .host_str()
                .is_some_and(|host| self.sts.is_sts_host(host));
        demanded && !self.exceptions.test(spec)
    }

    /// Rewrites `url` to `https` in place when forcing applies.
    pub fn force(&self, url: &mut Url) -> bool {
        if !self.must_force(url) {
            return false;
        }
        let spec = url.as_str().to_owned();
        if url.set_scheme("https").is_err() {
            warn!(url = %spec, "could not force https");
            return false;
        }
        info!(url = %spec, "forcing https");
        true
    }

    /// Learns strict-transport grants from a response.
    ///
    /// Headers arriving over plaintext are ignored; an attacker on the
    /// path could otherwise plant or revoke grants.
    pub fn process_response_headers(&self, url: &Url, headers: &HeaderMap) {
        if url.scheme() != "https" {
            return;
        }
        let Some(host) = url.host_str() else { return };
        for value in headers.get_all(STRICT_TRANSPORT_SECURITY) {
            if let Ok(value) = value.to_str() {
                self.sts.add_from_header(host, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn matcher(text: &str) -> AddressMatcher {
        let (m, errors) = AddressMatcher::compile(text, Default::default());
        assert!(errors.is_empty());
        m
    }

    #[test]
    fn test_forced_pattern_rewrites_scheme() {
        let mut enforcer = HttpsEnforcer::with_sts(StsStore::new());
        enforcer.set_forced(matcher("bank.example"));

        let mut target = url("http://bank.example/login?x=1");
        assert!(enforcer.force(&mut target));
        assert_eq!(target.as_str(), "https://bank.example/login?x=1");
    }

    #[test]
    fn test_https_target_untouched() {
        let mut enforcer = HttpsEnforcer::with_sts(StsStore::new());
        enforcer.set_forced(matcher("bank.example"));

        let mut target = url("https://bank.example/");
        assert!(!enforcer.force(&mut target));
        assert_eq!(target.scheme(), "https");
    }

    #[test]
    fn test_sts_host_is_forced() {
        let enforcer = HttpsEnforcer::with_sts(StsStore::new());
        enforcer.sts().seed("bank.example", true);

        assert!(enforcer.must_force(&url("http://bank.example/")));
        assert!(enforcer.must_force(&url("http://login.bank.example/")));
        assert!(!enforcer.must_force(&url("http://other.example/")));
    }

    #[test]
    fn test_exception_wins_over_sts() {
        let mut enforcer = HttpsEnforcer::with_sts(StsStore::new());
        enforcer.sts().seed("bank.example", false);
        enforcer.set_exceptions(matcher("bank.example"));

        let mut target = url("http://bank.example/");
        assert!(!enforcer.force(&mut target));
        assert_eq!(target.scheme(), "http");
    }

    #[test]
    fn test_sts_learned_from_secure_response_only() {
        let enforcer = HttpsEnforcer::with_sts(StsStore::new());
        let mut headers = HeaderMap::new();
        headers.insert(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );

        enforcer.process_response_headers(&url("http://bank.example/"), &headers);
        assert!(!enforcer.must_force(&url("http://bank.example/")));

        enforcer.process_response_headers(&url("https://bank.example/"), &headers);
        assert!(enforcer.must_force(&url("http://bank.example/")));
        assert!(enforcer.must_force(&url("http://login.bank.example/")));
    }
}
