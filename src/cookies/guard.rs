//! Secure-cookie enforcement over response and navigation headers.
//!
//! NoScript mapping: `HTTPS.handleSecureCookies`,
//! `HTTPS.handleCrossSiteCookies` and `HTTPS.cookiesCleanup`.
//!
//! On a secure response the guard classifies every `Set-Cookie` line;
//! lines missing the `Secure` attribute get it force-appended unless
//! the site proves it manages secure cookies itself. Patched cookies
//! enter a per-scope registry so later cross-scheme navigations can
//! toggle them back into a usable state.

use std::collections::HashMap;

use dashmap::DashMap;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use crate::cookies::jar::CookieJar;
use crate::cookies::record::TrackedCookie;
use crate::request::descriptor::ContextId;
use crate::sites::matcher::AddressMatcher;

/// Where an unsafe-cookie registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieScope {
    Global,
    Tab(ContextId),
}

/// What the guard did with a response's cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookiePatchOutcome {
    /// Enforcement is off.
    Disabled,
    /// Plain scheme, exception match, or no usable host.
    Exempt,
    /// No `Set-Cookie` header present.
    NoCookies,
    /// Every line already carried `Secure` and belonged to the host.
    AllSecure,
    /// An existing secure cookie covers this host; unsafe lines were
    /// left alone and the registry was cleaned.
    TrustedSecure,
    /// Unsafe lines were re-emitted with `Secure` appended.
    Patched { count: usize, forced: bool },
}

pub struct CookieSecurityGuard {
    jar: CookieJar,
    scopes: DashMap<CookieScope, HashMap<String, TrackedCookie>>,
    enabled: bool,
    per_tab: bool,
    recycle_secure: bool,
    exceptions: AddressMatcher,
    forced: AddressMatcher,
}

impl CookieSecurityGuard {
    pub fn new(jar: CookieJar) -> Self {
        Self {
            jar,
            scopes: DashMap::new(),
            enabled: false,
            per_tab: false,
            recycle_secure: false,
            exceptions: AddressMatcher::never(),
            forced: AddressMatcher::never(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }

    pub fn set_per_tab(&mut self, on: bool) {
        self.per_tab = on;
    }

    pub fn set_recycle_secure(&mut self, on: bool) {
        self.recycle_secure = on;
    }

    pub fn set_exceptions(&mut self, matcher: AddressMatcher) {
        self.exceptions = matcher;
    }

    pub fn set_forced(&mut self, matcher: AddressMatcher) {
        self.forced = matcher;
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    fn scope_for(&self, ctx: Option<ContextId>) -> Option<CookieScope> {
        if self.per_tab {
            ctx.map(CookieScope::Tab)
        } else {
            Some(CookieScope::Global)
        }
    }

    fn store_scope(&self, scope: Option<CookieScope>, map: HashMap<String, TrackedCookie>) {
        if let Some(s) = scope {
            if map.is_empty() {
                self.scopes.remove(&s);
            } else {
                self.scopes.insert(s, map);
            }
        }
    }

    /// Registry contents for a scope, mostly for status display.
    pub fn unsafe_cookies(&self, ctx: Option<ContextId>) -> Vec<TrackedCookie> {
        self.scope_for(ctx)
            .and_then(|s| self.scopes.get(&s))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Classifies and patches the `Set-Cookie` lines of one secure
    /// response. Lines are newline-delimited within each header value.
    pub fn process_response(
        &self,
        url: &Url,
        headers: &mut HeaderMap,
        ctx: Option<ContextId>,
    ) -> CookiePatchOutcome {
        if !self.enabled {
            return CookiePatchOutcome::Disabled;
        }
        if url.scheme() != "https" || self.exceptions.test(url.as_str()) {
            return CookiePatchOutcome::Exempt;
        }
        let host = match url.host_str() {
            Some(h) => h.to_owned(),
            None => return CookiePatchOutcome::Exempt,
        };

        let lines: Vec<String> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split('\n'))
            .filter(|l| !l.trim().is_empty())
            .map(str::to_owned)
            .collect();
        if lines.is_empty() {
            return CookiePatchOutcome::NoCookies;
        }

        let forced = self.forced.test(url.as_str());
        let scope = self.scope_for(ctx);
        let mut registry = scope
            .and_then(|s| self.scopes.get(&s).map(|e| e.value().clone()))
            .unwrap_or_default();

        let mut secure_found: Option<TrackedCookie> = None;
        let mut unsafe_cookies: Vec<TrackedCookie> = Vec::new();
        for line in &lines {
            let c = TrackedCookie::parse(line, &host);
            if c.secure && c.belongs_to(&host) {
                debug!(host = %host, cookie = %c.name, "secure cookie set by site");
                registry.remove(&c.id());
                secure_found = Some(c);
            } else {
                unsafe_cookies.push(c);
            }
        }

        // no secure cookie in this response: maybe one already exists
        if !unsafe_cookies.is_empty() && !forced && secure_found.is_none() {
            secure_found = self.jar.find(&host, |c| {
                c.secure && !unsafe_cookies.iter().any(|u| u.same_identity(c))
            });
            if let Some(ref c) = secure_found {
                debug!(host = %host, cookie = %c.name, "existing secure cookie found");
            }
        }

        if let Some(ref reference) = secure_found {
            if !forced {
                self.store_scope(scope, registry);
                self.cookies_cleanup(Some(reference));
                return CookiePatchOutcome::TrustedSecure;
            }
        }
        if unsafe_cookies.is_empty() {
            self.store_scope(scope, registry);
            return CookiePatchOutcome::AllSecure;
        }

        headers.remove(SET_COOKIE);
        let count = unsafe_cookies.len();
        for mut c in unsafe_cookies {
            c.secure = true;
            match HeaderValue::from_str(&c.set_cookie_with_secure()) {
                Ok(v) => {
                    headers.append(SET_COOKIE, v);
                }
                Err(_) => warn!(host = %host, cookie = %c.name, "unpatchable cookie line dropped"),
            }
            info!(host = %host, cookie = %c.name, forced, "secured cookie");
            registry.insert(c.id(), c);
        }
        self.store_scope(scope, registry);
        CookiePatchOutcome::Patched { count, forced }
    }

    /// Rewrites the outgoing `Cookie` header on a cross-scheme
    /// navigation so guard-secured cookies stay usable. Returns
    /// whether the header was replaced.
    ///
    /// Both directions require the recycle option: toggling cookies
    /// off `Secure` for a plaintext destination, and back on when
    /// returning to an encrypted one.
    pub fn handle_cross_site(
        &self,
        url: &Url,
        origin: &str,
        headers: &mut HeaderMap,
        ctx: Option<ContextId>,
    ) -> bool {
        let scope = match self.scope_for(ctx) {
            Some(s) => s,
            None => return false,
        };
        if !self.scopes.contains_key(&scope) {
            return false;
        }

        let dscheme = url.scheme();
        let oparts = match parse_origin(origin) {
            Some(p) => p,
            None => return false,
        };
        if dscheme != "http" && dscheme != "https" {
            return false;
        }
        if oparts.scheme == dscheme {
            return false;
        }
        if !self.recycle_secure {
            return false;
        }
        let dsecure = dscheme == "https";
        let dhost = match url.host_str() {
            Some(h) => h.to_owned(),
            None => return false,
        };
        let dpath = url.path();

        let mut registry = self
            .scopes
            .get(&scope)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut origin_count = 0usize;
        let mut total = 0usize;
        let mut dest_ids: Vec<String> = Vec::new();
        let mut stale: Vec<String> = Vec::new();
        for (id, c) in &registry {
            if !self.jar.exists(c) {
                stale.push(id.clone());
                continue;
            }
            total += 1;
            if c.belongs_to_path(&dhost, dpath) && c.secure != dsecure {
                dest_ids.push(id.clone());
            }
            if c.belongs_to_path(&oparts.host, &oparts.path) {
                origin_count += 1;
            }
        }
        for id in &stale {
            registry.remove(id);
        }

        if total == 0 {
            self.scopes.remove(&scope);
            return false;
        }
        // desecurify only when the origin actually shared secured cookies
        if (origin_count == 0 && !dsecure) || dest_ids.is_empty() {
            self.store_scope(Some(scope), registry);
            return false;
        }

        if dsecure {
            info!(origin = %origin, dest = %url, "re-securing cookies for encrypted destination");
        } else {
            warn!(
                origin = %origin,
                dest = %url,
                "unsafe navigation with secured cookies; consider forcing https for this host"
            );
        }

        // jar view captured before the toggles below change it
        let jar_header = self.jar.cookie_header_for(url);

        let mut pairs: Vec<(String, String)> = Vec::new();
        for id in &dest_ids {
            if let Some(c) = registry.get_mut(id) {
                c.secure = dsecure;
                self.jar.save(c);
                debug!(cookie = %c.name, secure = dsecure, "toggled secure flag");
                pairs.push((c.name.clone(), c.value.clone()));
            }
        }

        if let Some(cs) = jar_header {
            for part in cs.split("; ") {
                if let Some((name, value)) = part.split_once('=') {
                    if pairs.iter().all(|(n, _)| n != name) {
                        pairs.push((name.to_owned(), value.to_owned()));
                    }
                }
            }
        }

        let header_value = pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        debug!(host = %dhost, cookies = %header_value, "sending rewritten cookie header");
        if let Ok(v) = HeaderValue::from_str(&header_value) {
            // replace outright: merge syntax breaks Cookie semantics
            headers.insert(COOKIE, v);
        }
        self.store_scope(Some(scope), registry);
        true
    }

    /// Unwinds forced `Secure` flags.
    ///
    /// With a reference cookie, entries on that cookie's host are
    /// released (the site proved it can secure itself). Without one,
    /// exception-matched hosts are released, and everything goes when
    /// the guard is disabled. Emptied scopes free their storage.
    pub fn cookies_cleanup(&self, reference: Option<&TrackedCookie>) {
        let disabled = !self.enabled;
        let mut emptied: Vec<CookieScope> = Vec::new();
        for mut entry in self.scopes.iter_mut() {
            let map = entry.value_mut();
            map.retain(|_, c| {
                let drop = disabled
                    || match reference {
                        Some(rc) => c.belongs_to(&rc.raw_host),
                        None => self.exceptions.test(&c.raw_host),
                    };
                if drop && self.jar.exists(c) {
                    debug!(cookie = %c.name, "clearing forced secure flag");
                    let mut cleared = c.clone();
                    cleared.secure = false;
                    self.jar.save(&cleared);
                }
                !drop
            });
            if map.is_empty() {
                emptied.push(*entry.key());
            }
        }
        for scope in emptied {
            self.scopes.remove(&scope);
        }
    }
}

struct OriginParts {
    scheme: String,
    host: String,
    path: String,
}

/// Splits an origin spec into scheme, host and path. The origin must
/// be a web URL with an explicit path; the host ends at the first
/// colon or slash.
fn parse_origin(origin: &str) -> Option<OriginParts> {
    let (scheme, rest) = origin.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host_end = rest.find(['/', ':'])?;
    let host = &rest[..host_end];
    if host.is_empty() {
        return None;
    }
    let path_start = host_end + rest[host_end..].find('/')?;
    Some(OriginParts {
        scheme: scheme.to_owned(),
        host: host.to_owned(),
        path: rest[path_start..].to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure_url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn set_cookie_headers(lines: &[&str]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for l in lines {
            h.append(SET_COOKIE, HeaderValue::from_str(l).unwrap());
        }
        h
    }

    fn enabled_guard() -> CookieSecurityGuard {
        let mut g = CookieSecurityGuard::new(CookieJar::new());
        g.set_enabled(true);
        g
    }

    fn collect_set_cookies(h: &HeaderMap) -> Vec<String> {
        h.get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn test_disabled_passthrough() {
        let g = CookieSecurityGuard::new(CookieJar::new());
        let mut h = set_cookie_headers(&["sid=1"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Disabled);
        assert_eq!(collect_set_cookies(&h), vec!["sid=1"]);
    }

    #[test]
    fn test_plain_scheme_exempt() {
        let g = enabled_guard();
        let mut h = set_cookie_headers(&["sid=1"]);
        let out = g.process_response(&secure_url("http://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Exempt);
    }

    #[test]
    fn test_exceptions_list_exempts() {
        let mut g = enabled_guard();
        let (m, errs) = AddressMatcher::compile("https://legacy.example.com", Default::default());
        assert!(errs.is_empty());
        g.set_exceptions(m);
        let mut h = set_cookie_headers(&["sid=1"]);
        let out = g.process_response(&secure_url("https://legacy.example.com/login"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Exempt);
        assert_eq!(collect_set_cookies(&h), vec!["sid=1"]);
    }

    #[test]
    fn test_patch_appends_secure() {
        let g = enabled_guard();
        let mut h = set_cookie_headers(&["sid=1; Path=/"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Patched { count: 1, forced: false });
        assert_eq!(collect_set_cookies(&h), vec!["sid=1; Path=/;Secure"]);
        assert_eq!(g.unsafe_cookies(None).len(), 1);
    }

    #[test]
    fn test_patch_idempotent() {
        let g = enabled_guard();
        let url = secure_url("https://example.com/");
        let mut h = set_cookie_headers(&["sid=1"]);
        g.process_response(&url, &mut h, None);
        let patched_line = collect_set_cookies(&h)[0].clone();
        // the embedder applies the patched header to its store
        g.jar().save(&TrackedCookie::parse(&patched_line, "example.com"));

        let mut again = set_cookie_headers(&[patched_line.as_str()]);
        let out = g.process_response(&url, &mut again, None);
        assert_eq!(out, CookiePatchOutcome::TrustedSecure);
        assert_eq!(collect_set_cookies(&again), vec![patched_line]);
        assert!(g.unsafe_cookies(None).is_empty());
    }

    #[test]
    fn test_all_secure_response() {
        let g = enabled_guard();
        let mut h = set_cookie_headers(&["sid=1; Secure"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::TrustedSecure);
        assert_eq!(collect_set_cookies(&h), vec!["sid=1; Secure"]);
    }

    #[test]
    fn test_secure_response_plus_insecure_line_trusts_site() {
        let g = enabled_guard();
        let mut h = set_cookie_headers(&["sid=1; Secure", "theme=dark"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        // the site secures its own session cookie: leave it alone
        assert_eq!(out, CookiePatchOutcome::TrustedSecure);
        assert_eq!(g.unsafe_cookies(None).len(), 0);
    }

    #[test]
    fn test_forced_patches_even_with_secure_cookie() {
        let mut g = enabled_guard();
        let (m, _) = AddressMatcher::compile("https://example.com", Default::default());
        g.set_forced(m);
        let mut h = set_cookie_headers(&["sid=1; Secure", "theme=dark"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Patched { count: 1, forced: true });
        assert_eq!(collect_set_cookies(&h), vec!["theme=dark;Secure"]);
    }

    #[test]
    fn test_history_probe_suppresses_patch() {
        let g = enabled_guard();
        g.jar()
            .save(&TrackedCookie::parse("sess=old; Secure", "example.com"));
        let mut h = set_cookie_headers(&["tmp=1"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::TrustedSecure);
        assert_eq!(collect_set_cookies(&h), vec!["tmp=1"]);
    }

    #[test]
    fn test_history_probe_ignores_shadowed_cookie() {
        let g = enabled_guard();
        g.jar()
            .save(&TrackedCookie::parse("sid=old; Secure", "example.com"));
        // the response re-sets the same cookie without Secure: downgrade attempt
        let mut h = set_cookie_headers(&["sid=new"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Patched { count: 1, forced: false });
        assert_eq!(collect_set_cookies(&h), vec!["sid=new;Secure"]);
    }

    #[test]
    fn test_foreign_domain_cookie_counts_as_unsafe() {
        let g = enabled_guard();
        let mut h = set_cookie_headers(&["track=1; Domain=ads.example.org; Secure"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h, None);
        assert_eq!(out, CookiePatchOutcome::Patched { count: 1, forced: false });
    }

    #[test]
    fn test_per_tab_scopes_isolated() {
        let mut g = enabled_guard();
        g.set_per_tab(true);
        let mut h = set_cookie_headers(&["sid=1"]);
        g.process_response(&secure_url("https://example.com/"), &mut h, Some(ContextId(1)));
        assert_eq!(g.unsafe_cookies(Some(ContextId(1))).len(), 1);
        assert!(g.unsafe_cookies(Some(ContextId(2))).is_empty());

        // no context in per-tab mode: header still patched, nothing recorded
        let mut h2 = set_cookie_headers(&["other=2"]);
        let out = g.process_response(&secure_url("https://example.com/"), &mut h2, None);
        assert_eq!(out, CookiePatchOutcome::Patched { count: 1, forced: false });
        assert!(g.unsafe_cookies(None).is_empty());
    }

    fn patch_and_store(g: &CookieSecurityGuard, url: &str, line: &str) {
        let u = secure_url(url);
        let mut h = set_cookie_headers(&[line]);
        let out = g.process_response(&u, &mut h, None);
        assert!(matches!(out, CookiePatchOutcome::Patched { .. }));
        let patched = collect_set_cookies(&h)[0].clone();
        g.jar()
            .save(&TrackedCookie::parse(&patched, u.host_str().unwrap()));
    }

    #[test]
    fn test_cross_site_disabled_recycle_leaves_cookie_alone() {
        let mut g = enabled_guard();
        g.set_recycle_secure(false);
        patch_and_store(&g, "https://bank.example/", "sid=1");

        let dest = secure_url("http://bank.example/");
        let mut h = HeaderMap::new();
        let rewritten = g.handle_cross_site(&dest, "https://bank.example/", &mut h, None);
        assert!(!rewritten);
        assert!(h.get(COOKIE).is_none());
        // still secured in the store, so never sent over plaintext
        let jar_cookie = g
            .jar()
            .find("bank.example", |c| c.name == "sid")
            .unwrap();
        assert!(jar_cookie.secure);
    }

    #[test]
    fn test_cross_site_recycle_toggles_and_sends() {
        let mut g = enabled_guard();
        g.set_recycle_secure(true);
        patch_and_store(&g, "https://bank.example/", "sid=1");

        let dest = secure_url("http://bank.example/");
        let mut h = HeaderMap::new();
        let rewritten = g.handle_cross_site(&dest, "https://bank.example/", &mut h, None);
        assert!(rewritten);
        assert_eq!(h.get(COOKIE).unwrap().to_str().unwrap(), "sid=1");
        let jar_cookie = g
            .jar()
            .find("bank.example", |c| c.name == "sid")
            .unwrap();
        assert!(!jar_cookie.secure);
    }

    #[test]
    fn test_cross_site_back_to_https_resecures() {
        let mut g = enabled_guard();
        g.set_recycle_secure(true);
        patch_and_store(&g, "https://bank.example/", "sid=1");

        let plain = secure_url("http://bank.example/");
        let mut h1 = HeaderMap::new();
        assert!(g.handle_cross_site(&plain, "https://bank.example/", &mut h1, None));

        let back = secure_url("https://bank.example/");
        let mut h2 = HeaderMap::new();
        assert!(g.handle_cross_site(&back, "http://bank.example/", &mut h2, None));
        let jar_cookie = g
            .jar()
            .find("bank.example", |c| c.name == "sid")
            .unwrap();
        assert!(jar_cookie.secure);
        assert_eq!(h2.get(COOKIE).unwrap().to_str().unwrap(), "sid=1");
    }

    #[test]
    fn test_cross_site_same_scheme_untouched() {
        let mut g = enabled_guard();
        g.set_recycle_secure(true);
        patch_and_store(&g, "https://bank.example/", "sid=1");

        let dest = secure_url("https://bank.example/page");
        let mut h = HeaderMap::new();
        assert!(!g.handle_cross_site(&dest, "https://bank.example/", &mut h, None));
    }

    #[test]
    fn test_cross_site_requires_origin_with_path() {
        let mut g = enabled_guard();
        g.set_recycle_secure(true);
        patch_and_store(&g, "https://bank.example/", "sid=1");

        let dest = secure_url("http://bank.example/");
        let mut h = HeaderMap::new();
        assert!(!g.handle_cross_site(&dest, "https://bank.example", &mut h, None));
    }

    #[test]
    fn test_cross_site_stale_entries_pruned() {
        let mut g = enabled_guard();
        g.set_recycle_secure(true);
        patch_and_store(&g, "https://bank.example/", "sid=1");
        // the store loses the cookie behind the guard's back
        let c = g.jar().find("bank.example", |c| c.name == "sid").unwrap();
        g.jar().remove(&c);

        let dest = secure_url("http://bank.example/");
        let mut h = HeaderMap::new();
        assert!(!g.handle_cross_site(&dest, "https://bank.example/", &mut h, None));
        assert!(g.unsafe_cookies(None).is_empty());
    }

    #[test]
    fn test_cleanup_on_disable_clears_flags() {
        let mut g = enabled_guard();
        patch_and_store(&g, "https://bank.example/", "sid=1");
        assert!(g.jar().find("bank.example", |c| c.secure).is_some());

        g.set_enabled(false);
        g.cookies_cleanup(None);
        assert!(g.unsafe_cookies(None).is_empty());
        let jar_cookie = g.jar().find("bank.example", |c| c.name == "sid").unwrap();
        assert!(!jar_cookie.secure);
    }

    #[test]
    fn test_cleanup_with_exceptions() {
        let mut g = enabled_guard();
        patch_and_store(&g, "https://bank.example/", "sid=1");
        patch_and_store(&g, "https://shop.example/", "cart=2");

        let (m, _) = AddressMatcher::compile("bank.example", Default::default());
        g.set_exceptions(m);
        g.cookies_cleanup(None);

        let remaining = g.unsafe_cookies(None);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "cart");
    }

    #[test]
    fn test_parse_origin_shapes() {
        assert!(parse_origin("https://example.com/").is_some());
        assert!(parse_origin("https://example.com").is_none());
        assert!(parse_origin("ftp://example.com/").is_none());
        let p = parse_origin("https://example.com:8443/app").unwrap();
        assert_eq!(p.host, "example.com");
        assert_eq!(p.path, "/app");
    }
}
