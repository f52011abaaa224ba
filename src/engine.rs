//! The policy engine: configuration, trust, and every decision surface
//! an embedder calls into.
//!
//! NoScript mapping:
//!
//! | NoScript (JS)            | trustnet (Rust)                     |
//! |--------------------------|-------------------------------------|
//! | `shouldLoad` core        | [`Engine::should_allow`]            |
//! | `syncPrefs`              | [`Engine::apply_config`]            |
//! | `objectWhitelist`        | [`Engine::allow_object`] and kin    |
//! | `autoTemp` on documents  | [`Engine::auto_allow_document`]     |
//! | content-policy plumbing  | the `on_request_*` pass-throughs    |
//!
//! The engine owns one of everything: the trust registry, the cookie
//! guard, the https enforcer, the DNS cache and the lifecycle
//! coordinator. Decision entry points take `&self`; configuration and
//! trust edits take `&mut self`.

use dashmap::DashMap;
use http::HeaderMap;
use tracing::{debug, info};
use url::Url;

use crate::base::error::PolicyError;
use crate::base::status::RequestStatus;
use crate::config::{ConfigDelta, EngineConfig, IframeContext, XhrPolicy};
use crate::cookies::guard::{CookiePatchOutcome, CookieSecurityGuard};
use crate::cookies::jar::CookieJar;
use crate::cookies::suffix::same_base_domain;
use crate::dns::DnsCache;
use crate::https::HttpsEnforcer;
use crate::request::coordinator::RequestLifecycleCoordinator;
use crate::request::descriptor::{
    ContentKind, ContentRequest, ContextId, LoadFlags, RequestDescriptor, RequestId,
};
use crate::request::redircache::RecentBlocks;
use crate::request::state::PolicyState;
use crate::sites::site_of;
use crate::sites::PolicySet;
use crate::trust::granularity::UntrustedGranularity;
use crate::trust::registry::TrustRegistry;

/// Verdict for one content request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block(BlockReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Script hosted on a site outside the whitelist.
    UntrustedScript,
    /// Embedded content from a blacklisted site.
    UntrustedContent,
    /// Plugin, media or font content forbidden by policy.
    ForbiddenObject,
    /// Frame denied by the embedding-context rules.
    ForbiddenFrame,
    /// Scripted request outside its allowed context.
    CrossSiteRequest,
}

pub struct Engine {
    config: EngineConfig,
    registry: TrustRegistry,
    guard: CookieSecurityGuard,
    enforcer: HttpsEnforcer,
    dns: DnsCache,
    lifecycle: RequestLifecycleCoordinator,
    blocked: RecentBlocks,
    /// Click-to-load grants: whitelist key to allowed mime types,
    /// `["*"]` meaning all.
    objects: DashMap<String, Vec<String>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine::with_jar(config, CookieJar::new())
    }

    /// Builds an engine around an embedder-provided cookie store.
    pub fn with_jar(config: EngineConfig, jar: CookieJar) -> Self {
        let mut engine = Engine {
            config: EngineConfig::default(),
            registry: TrustRegistry::new(config.wildcard_depth),
            guard: CookieSecurityGuard::new(jar),
            enforcer: HttpsEnforcer::new(),
            dns: DnsCache::new(),
            lifecycle: RequestLifecycleCoordinator::new(),
            blocked: RecentBlocks::new(),
            objects: DashMap::new(),
        };
        // first-run whitelist seed; apply_config folds the mandatory
        // sites in on top
        engine.registry.load_allowed_list(&config.default_list);
        engine.apply_config(config);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TrustRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TrustRegistry {
        &mut self.registry
    }

    pub fn guard(&self) -> &CookieSecurityGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut CookieSecurityGuard {
        &mut self.guard
    }

    pub fn enforcer(&self) -> &HttpsEnforcer {
        &self.enforcer
    }

    pub fn dns(&self) -> &DnsCache {
        &self.dns
    }

    pub fn lifecycle(&self) -> &RequestLifecycleCoordinator {
        &self.lifecycle
    }

    /// Applies a full configuration, recompiling every derived matcher.
    ///
    /// Toggling cookie enforcement (or changing its exception list)
    /// runs a cleanup pass so forced `Secure` flags never outlive the
    /// setting that forced them.
    pub fn apply_config(&mut self, next: EngineConfig) {
        if next.wildcard_depth != self.config.wildcard_depth {
            self.registry.set_depth(next.wildcard_depth);
        }
        self.registry.load_mandatory_list(&next.mandatory_list);
        self.registry.set_global_allow(next.global_allow);
        self.registry
            .set_block_untrusted_content(next.block_untrusted_content);
        self.registry.set_auto_allow(next.auto_allow);
        self.registry
            .set_forbid_implies_untrust(next.forbid_implies_untrust);
        self.registry.set_ignore_ports(next.ignore_ports);
        self.registry
            .set_granularity(UntrustedGranularity::from_mask(next.untrusted_granularity));
        self.registry.set_docshell_js(next.docshell_js);
        self.registry.transport_mut().set_level(next.https_only);
        self.registry
            .set_extra_allow(next.compile_patterns(&next.extra_allow_patterns, "extra_allow"));

        self.enforcer
            .set_forced(next.compile_patterns(&next.https_forced_patterns, "https_forced"));
        self.enforcer.set_exceptions(next.compile_patterns(
            &next.https_forced_exception_patterns,
            "https_forced_exceptions",
        ));

        let cookies_changed = self.config.secure_cookies != next.secure_cookies
            || self.config.secure_cookies_exception_patterns
                != next.secure_cookies_exception_patterns;
        self.guard.set_enabled(next.secure_cookies);
        self.guard.set_per_tab(next.secure_cookies_per_tab);
        self.guard.set_recycle_secure(next.secure_cookies_recycle);
        self.guard.set_exceptions(next.compile_patterns(
            &next.secure_cookies_exception_patterns,
            "secure_cookies_exceptions",
        ));
        self.guard.set_forced(next.compile_patterns(
            &next.secure_cookies_forced_patterns,
            "secure_cookies_forced",
        ));
        if cookies_changed {
            self.guard.cookies_cleanup(None);
        }

        self.config = next;
    }

    /// Merges a partial preference change over the current snapshot and
    /// applies the result.
    pub fn apply_delta(&mut self, delta: &ConfigDelta) {
        let next = delta.merged(&self.config);
        self.apply_config(next);
    }

    /// Session teardown: temporary grants go away and forced cookie
    /// flags unwind.
    pub fn dispose(&mut self) {
        self.erase_temp();
        self.guard.set_enabled(false);
        self.guard.cookies_cleanup(None);
    }

    // ---- decision surface --------------------------------------------

    /// The content gate: may `request.url` load in its context?
    pub fn should_allow(&self, request: &ContentRequest) -> Decision {
        let site = request.site();
        let scheme_key = format!("{}:", request.url.scheme());
        if self.registry.is_mandatory(&site) || self.registry.is_mandatory(&scheme_key) {
            return Decision::Allow;
        }

        match request.kind {
            ContentKind::Document
            | ContentKind::Other
            | ContentKind::Image
            | ContentKind::Stylesheet => Decision::Allow,
            ContentKind::Script => {
                if self.registry.js_status(&site) {
                    Decision::Allow
                } else {
                    Decision::Block(BlockReason::UntrustedScript)
                }
            }
            ContentKind::Object
            | ContentKind::ObjectSubrequest
            | ContentKind::Media
            | ContentKind::Font => self.decide_embed(request, &site),
            ContentKind::Subdocument => self.decide_frame(request, &site),
            ContentKind::Xhr => self.decide_xhr(request, &site),
        }
    }

    /// Runs the gate for a fresh load, parking the decision so the
    /// matching network request can claim it on start.
    pub fn begin_content_check(&self, request: &ContentRequest) -> Decision {
        let state = PolicyState::from(request);
        self.lifecycle.states().begin_check(&request.url, state);
        let decision = self.decide(request);
        match decision {
            Decision::Allow => {
                self.lifecycle.states().finish_check(&request.url);
            }
            Decision::Block(_) => {
                self.lifecycle.states().remove_check(&request.url);
            }
        }
        decision
    }

    fn decide(&self, request: &ContentRequest) -> Decision {
        let decision = self.should_allow(request);
        if let Decision::Block(reason) = decision {
            self.blocked.record(&request.site());
            debug!(uri = %request.url, kind = ?request.kind, ?reason, "content blocked");
        }
        decision
    }

    fn decide_embed(&self, request: &ContentRequest, site: &str) -> Decision {
        let forbid = match request.kind {
            ContentKind::Media => self.config.forbid_media,
            ContentKind::Font => self.config.forbid_fonts,
            _ => self.config.forbid_objects,
        };
        let untrusted = self.config.block_untrusted_content && self.registry.is_untrusted(site);
        let origin_ok = request
            .origin_site()
            .is_some_and(|o| self.registry.js_status(&o));
        let blocked = untrusted || (forbid && (self.config.content_blocker || !origin_ok));
        if blocked && !self.is_object_allowed(request.url.as_str(), request_mime(request), site) {
            return Decision::Block(if untrusted {
                BlockReason::UntrustedContent
            } else {
                BlockReason::ForbiddenObject
            });
        }
        Decision::Allow
    }

    fn decide_frame(&self, request: &ContentRequest, site: &str) -> Decision {
        let untrusted = self.config.block_untrusted_content && self.registry.is_untrusted(site);
        let forbid = self.config.forbid_iframes || self.config.forbid_frames;
        let context_blocked = forbid
            && match request.origin.as_ref() {
                Some(origin) if internal_frame_origin(origin.as_str()) => false,
                Some(origin) => self.forbidden_iframe_context(origin, &request.url),
                // no origin at all: cross-domain by definition
                None => true,
            };
        if (untrusted || context_blocked)
            && !self.is_object_allowed(request.url.as_str(), request_mime(request), site)
        {
            return Decision::Block(if untrusted {
                BlockReason::UntrustedContent
            } else {
                BlockReason::ForbiddenFrame
            });
        }
        Decision::Allow
    }

    /// The embedding-context rules for subframes.
    ///
    /// The levels nest downward: a same-host frame can still be denied
    /// at `DifferentDomain` when an https-only policy makes the scheme
    /// part of the identity.
    fn forbidden_iframe_context(&self, origin: &Url, location: &Url) -> bool {
        if self.registry.transport().forbids(origin.as_str()) {
            // the transport veto already handles this origin
            return false;
        }
        let Some(domain) = location.host_str() else {
            return false;
        };
        match self.config.iframe_context {
            IframeContext::AllIframes => true,
            IframeContext::DifferentBaseDomain => !origin
                .host_str()
                .is_some_and(|o| same_base_domain(o, domain)),
            IframeContext::DifferentDomain => {
                if origin.host_str() != Some(domain) {
                    return true;
                }
                let downgraded = match location.as_str().strip_prefix("https:") {
                    Some(rest) => format!("http:{rest}"),
                    None => location.as_str().to_owned(),
                };
                if !self.registry.transport().forbids(&downgraded) {
                    return false;
                }
                site_of(origin) != site_of(location)
            }
            IframeContext::DifferentSite => site_of(origin) != site_of(location),
        }
    }

    fn decide_xhr(&self, request: &ContentRequest, site: &str) -> Decision {
        // hidden-window and extension traffic looks like XHR; let it be
        if request.url.scheme() == "chrome" || request.url.as_str() == "about:blank" {
            return Decision::Allow;
        }
        let Some(origin) = request.origin.as_ref() else {
            return Decision::Allow;
        };
        let ospec = origin.as_str();
        if ospec.starts_with("chrome:") || ospec.starts_with("resource:") || ospec == "about:blank"
        {
            return Decision::Allow;
        }
        let forbidden = match self.config.xhr_policy {
            XhrPolicy::ForbidAll => true,
            XhrPolicy::SameSite => site_of(origin) != site || !self.registry.js_status(site),
            XhrPolicy::TrustedTargets => !self.registry.js_status(site),
            XhrPolicy::AllowAll => false,
        };
        if forbidden {
            Decision::Block(BlockReason::CrossSiteRequest)
        } else {
            Decision::Allow
        }
    }

    // ---- lifecycle pass-throughs -------------------------------------

    pub fn on_request_start(&self, desc: &RequestDescriptor) -> Result<(), PolicyError> {
        self.lifecycle.on_start(desc, |r| self.decide(r))
    }

    /// Redirect hop: https forcing, decision re-validation, and (for
    /// document transitions) cross-scheme cookie recycling on the
    /// outgoing headers.
    pub fn on_request_redirect(
        &self,
        old: &RequestDescriptor,
        new_url: &mut Url,
        new_mime: Option<&str>,
        new_flags: LoadFlags,
        headers: &mut HeaderMap,
    ) -> Result<(), PolicyError> {
        self.lifecycle.on_redirect(
            old,
            new_url,
            new_mime,
            &self.enforcer,
            &self.registry,
            |r| self.decide(r),
        )?;

        let document_transition = old.is_document_load()
            || (new_flags.contains(LoadFlags::DOCUMENT_URI)
                && site_of(&old.url) != site_of(new_url));
        if document_transition {
            self.guard
                .handle_cross_site(new_url, old.url.as_str(), headers, old.context);
        }
        Ok(())
    }

    pub fn on_request_stop(&self, id: RequestId, url: &Url, status: RequestStatus) {
        self.lifecycle.on_stop(id, url, status, &self.dns);
    }

    /// Whether the embedder should repeat its rule checks for this
    /// request once the in-flight DNS resolution lands.
    pub fn on_dns_resolving(&self, desc: &RequestDescriptor) -> bool {
        self.lifecycle.on_dns_resolving(desc, &self.dns)
    }

    // ---- response and navigation headers -----------------------------

    /// Secure-response bookkeeping: strict-transport grants are
    /// ingested, then `Set-Cookie` lines are classified and patched.
    pub fn on_response_headers(
        &self,
        url: &Url,
        headers: &mut HeaderMap,
        ctx: Option<ContextId>,
    ) -> CookiePatchOutcome {
        self.enforcer.process_response_headers(url, headers);
        self.guard.process_response(url, headers, ctx)
    }

    /// Cross-scheme navigation driven by the embedder (not through a
    /// redirect hop). Returns whether the `Cookie` header was rewritten.
    pub fn on_cross_site_navigation(
        &self,
        url: &Url,
        origin: &str,
        headers: &mut HeaderMap,
        ctx: Option<ContextId>,
    ) -> bool {
        self.guard.handle_cross_site(url, origin, headers, ctx)
    }

    /// Upgrades a navigation target in place when policy requires it.
    pub fn force_https(&self, url: &mut Url) -> bool {
        self.enforcer.force(url)
    }

    // ---- trust surface -----------------------------------------------

    pub fn js_status(&self, site: &str) -> bool {
        self.registry.js_status(site)
    }

    pub fn is_js_enabled(&self, site: &str) -> bool {
        self.registry.is_js_enabled(site)
    }

    /// Grants or revokes trust, temporary or permanent, applying the
    /// configured blacklist-cascade granularity.
    pub fn set_trust(&mut self, site: &str, allow: bool, temporary: bool) -> bool {
        let cascade = self.registry.must_cascade_trust(site, temporary);
        let changed = self.registry.set_trust(site, allow, false, cascade);
        self.registry.set_temp(site, allow && temporary);
        changed
    }

    pub fn set_untrusted(&mut self, site: &str, on: bool) -> bool {
        self.registry.set_untrusted(site, on)
    }

    /// Temporary grant for a top-level document nobody has decided on,
    /// when automatic permissions are switched on.
    pub fn auto_allow_document(&mut self, url: &Url) -> bool {
        if !self.config.auto_allow {
            return false;
        }
        let site = site_of(url);
        if site.is_empty() {
            return false;
        }
        let granted = self.registry.auto_temp(&site);
        if granted {
            info!(site = %site, "temporary permission auto-granted");
        }
        granted
    }

    /// Drops every session-scoped grant, including click-to-load
    /// object permissions.
    pub fn erase_temp(&mut self) {
        self.registry.erase_temp();
        self.reset_allowed_objects();
    }

    /// The whitelist minus session-scoped entries, for persistence.
    pub fn permanent_sites(&self) -> PolicySet {
        self.registry.permanent_sites()
    }

    /// Sites with recently blocked content, oldest first.
    pub fn recently_blocked(&self) -> Vec<String> {
        self.blocked.list()
    }

    /// Whether a docshell rooted at `site` may keep scripting on.
    pub fn docshell_js_allowed(&self, site: &str) -> bool {
        self.registry.docshell_js_allowed(site)
    }

    // ---- click-to-load object whitelist ------------------------------

    /// Grants an object URL, `"*"` meaning every mime type.
    pub fn allow_object(&self, url: &str, mime: &str) {
        let key = object_key(url);
        let mut types = self.objects.entry(key).or_default();
        if mime == "*" {
            *types = vec!["*".to_owned()];
        } else if !types.iter().any(|m| m == "*" || m == mime) {
            types.push(mime.to_owned());
        }
    }

    /// Whether a grant covers `url` (or, walking upward, its site and
    /// the site's ancestors) for the given mime type.
    pub fn is_object_allowed(&self, url: &str, mime: &str, site: &str) -> bool {
        if self.objects.is_empty() {
            return false;
        }
        if self.object_grant_matches(&object_key(url), mime) {
            return true;
        }
        let mut probe = object_key(site);
        loop {
            if !probe.is_empty() && self.object_grant_matches(&probe, mime) {
                return true;
            }
            if !object_walk_continues(&probe) {
                return false;
            }
            let next = strip_object_prefix(&probe);
            if next == probe {
                return false;
            }
            probe = next;
        }
    }

    /// Whether any grant sits on this site or under it.
    pub fn any_allowed_object(&self, site: &str) -> bool {
        let key = object_key(site);
        if self.objects.contains_key(&key) {
            return true;
        }
        let prefix = format!("{key}/");
        self.objects.iter().any(|e| e.key().starts_with(&prefix))
    }

    pub fn reset_allowed_objects(&self) {
        self.objects.clear();
    }

    fn object_grant_matches(&self, key: &str, mime: &str) -> bool {
        self.objects
            .get(key)
            .is_some_and(|types| types.iter().any(|m| m == "*" || m == mime))
    }
}

fn request_mime(request: &ContentRequest) -> &str {
    request.mime.as_deref().unwrap_or("*")
}

fn internal_frame_origin(spec: &str) -> bool {
    spec.starts_with("chrome:") || spec.starts_with("resource:")
}

/// Canonical whitelist key for an object URL: credentials dropped and
/// the numeric shard of the first host label collapsed, so
/// `img3.cdn.example` and `img7.cdn.example` share one grant.
fn object_key(url: &str) -> String {
    let url = strip_credentials(url);
    let (prefix_len, host_rest) = match url.find("://") {
        Some(i) => (i + 3, &url[i + 3..]),
        None => (0, url.as_str()),
    };
    let bytes = host_rest.as_bytes();
    let mut label_end = 0;
    while label_end < bytes.len()
        && !matches!(bytes[label_end], b'.' | b'/')
        && !bytes[label_end].is_ascii_digit()
    {
        label_end += 1;
    }
    if label_end == 0 {
        return url;
    }
    let mut digits_end = label_end;
    while digits_end < bytes.len() && bytes[digits_end].is_ascii_digit() {
        digits_end += 1;
    }
    if digits_end == label_end || bytes.get(digits_end) != Some(&b'.') {
        return url;
    }
    // the shard collapse only applies inside a dotted host
    let tail = &host_rest[digits_end + 1..];
    match tail.find(['.', '/']) {
        Some(i) if i > 0 && tail.as_bytes()[i] == b'.' => format!(
            "{}{}",
            &url[..prefix_len + label_end],
            &url[prefix_len + digits_end..]
        ),
        _ => url,
    }
}

fn strip_credentials(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_owned();
    };
    let rest = &url[scheme_end + 3..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &url[..scheme_end + 3], &rest[at + 1..]),
        None => url.to_owned(),
    }
}

/// The ancestor walk keeps going while the probe still carries a scheme
/// separator or at least two host labels above the registry suffix.
fn object_walk_continues(probe: &str) -> bool {
    if probe.contains(":/") {
        return true;
    }
    match probe.find('.') {
        Some(i) => probe[i + 1..].contains('.'),
        None => false,
    }
}

/// One step up: drop through the scheme separator, or one leading host
/// label, whichever comes first.
fn strip_object_prefix(probe: &str) -> String {
    let colon_slash = probe.find(":/");
    let dot = probe.find('.');
    match (colon_slash, dot) {
        (Some(c), Some(d)) if c < d => probe[c + 1..].trim_start_matches('/').to_owned(),
        (Some(c), None) => probe[c + 1..].trim_start_matches('/').to_owned(),
        (_, Some(d)) => probe[d + 1..].to_owned(),
        (None, None) => probe.to_owned(),
    }
}
