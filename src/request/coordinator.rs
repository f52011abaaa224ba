//! Request lifecycle coordination: start, redirect, stop.
//!
//! Each callback is synchronous and terminal decisions are final: an
//! abort returned from here means the embedder cancels the channel and
//! the only event that may follow for that request is its stop (which
//! performs the final detach). Per-request state lives in the side
//! tables keyed by request id, so callbacks for different requests can
//! interleave freely.

use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::base::error::PolicyError;
use crate::base::status::{DnsRecovery, RequestStatus};
use crate::dns::DnsCache;
use crate::engine::Decision;
use crate::https::HttpsEnforcer;
use crate::request::descriptor::{ContentKind, ContentRequest, RequestCaps, RequestDescriptor, RequestId};
use crate::request::redircache::{RedirectCache, RedirectedLoad};
use crate::request::state::{PolicyStateTable, StateExtra};
use crate::sites::site_of;
use crate::trust::TrustRegistry;

pub struct RequestLifecycleCoordinator {
    states: PolicyStateTable,
    redirects: RedirectCache,
    /// Requests already granted a rules re-check after a DNS refresh.
    deferred: DashMap<u64, ()>,
}

impl Default for RequestLifecycleCoordinator {
    fn default() -> Self {
        RequestLifecycleCoordinator::new()
    }
}

impl RequestLifecycleCoordinator {
    pub fn new() -> Self {
        RequestLifecycleCoordinator {
            states: PolicyStateTable::new(),
            redirects: RedirectCache::new(),
            deferred: DashMap::new(),
        }
    }

    pub fn states(&self) -> &PolicyStateTable {
        &self.states
    }

    pub fn redirects(&self) -> &RedirectCache {
        &self.redirects
    }

    /// Request start. Claims the parked decision for the target, (for
    /// subframe documents) repeats it as a late frame check, and aborts
    /// when a previous check for the same target never resolved.
    pub fn on_start(
        &self,
        desc: &RequestDescriptor,
        decide: impl Fn(&ContentRequest) -> Decision,
    ) -> Result<(), PolicyError> {
        if self.states.is_checking(&desc.url) {
            // The content gate never completed for this target and the
            // network layer is already starting it again: a recursive
            // load would hang or loop, so drop the stale check and
            // refuse the restart.
            self.states.remove_check(&desc.url);
            warn!(uri = %desc.url, "content check never resolved, aborting restarted request");
            return Err(PolicyError::StuckCheck {
                uri: desc.url.to_string(),
            });
        }

        if desc.caps.contains(RequestCaps::HTTP) {
            self.states.attach(desc.id, &desc.url);
        }

        if desc.is_document_load() {
            if desc.url.as_str() == "about:blank" && desc.origin.is_none() {
                // Fresh tab placeholder; touching it breaks new-tab pages.
                return Ok(());
            }
            if desc.subframe {
                if let Some(state) = self.states.extract(desc.id) {
                    let mut request = state.to_request();
                    request.kind = ContentKind::Subdocument;
                    request.url = desc.url.clone();
                    if request.origin.is_none() {
                        request.origin = desc.origin.clone();
                    }
                    if let Decision::Block(reason) = decide(&request) {
                        info!(uri = %desc.url, ?reason, "late frame check denied load");
                        return Err(PolicyError::ContentBlocked {
                            site: site_of(&desc.url),
                            kind: ContentKind::Subdocument,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Redirect hop. Forces https on the new target when required, then
    /// re-validates the carried decision against it.
    ///
    /// Absent carried state means the old hop never went through the
    /// content gate; there is nothing to re-validate and the redirect
    /// passes. A deny drops the carried state (the veto is terminal), so
    /// nothing leaks.
    pub fn on_redirect(
        &self,
        old: &RequestDescriptor,
        new_url: &mut Url,
        new_mime: Option<&str>,
        enforcer: &HttpsEnforcer,
        registry: &TrustRegistry,
        decide: impl Fn(&ContentRequest) -> Decision,
    ) -> Result<(), PolicyError> {
        enforcer.force(new_url);

        let Some(mut state) = self.states.detach(old.id) else {
            return Ok(());
        };

        state.content_location = new_url.clone();

        // An untrusted redirector becomes the origin of the new hop, so
        // the re-decision sees who really initiated the load.
        if !registry.js_status(&site_of(&old.url)) {
            state.request_origin = Some(old.url.clone());
        }

        if let Some(mime) = new_mime.map(str::to_owned).or_else(|| old.mime.clone()) {
            state.mime = Some(mime);
        }

        if state.kind != ContentKind::Document {
            if let (Some(context), Some(document)) = (old.context, old.document_url.as_ref()) {
                self.redirects.push(
                    context,
                    document.as_str(),
                    RedirectedLoad {
                        site: site_of(new_url),
                        kind: state.kind,
                    },
                );
            }
            if state.kind == ContentKind::Subdocument {
                state.extra = StateExtra::FrameCheck;
            }
        }

        if let Decision::Block(reason) = decide(&state.to_request()) {
            warn!(
                from = %old.url,
                to = %new_url,
                kind = ?state.kind,
                ?reason,
                "redirect vetoed"
            );
            return Err(PolicyError::RedirectVetoed {
                from: old.url.to_string(),
                to: new_url.to_string(),
                kind: state.kind,
            });
        }

        self.states.restore_pending(new_url, state);
        Ok(())
    }

    /// Request completion. Detaching twice is a no-op, so this is safe
    /// to call after an abort as well as after normal completion.
    pub fn on_stop(&self, id: RequestId, url: &Url, status: RequestStatus, dns: &DnsCache) {
        self.states.detach(id);
        self.deferred.remove(&id.0);

        let Some(action) = status.dns_recovery() else {
            return;
        };
        let Some(host) = url.host_str() else { return };
        if DnsCache::is_ip(host) {
            return;
        }
        match action {
            DnsRecovery::Invalidate => {
                dns.invalidate(host);
            }
            DnsRecovery::Evict => {
                dns.evict(host);
            }
        }
    }

    /// "Resolving host" progress notification. When the cached mapping
    /// is missing, stale, or the load refuses caches, the entry is
    /// evicted and the caller is told to repeat its rule checks once the
    /// fresh answer arrives. At most one repeat per request.
    pub fn on_dns_resolving(&self, desc: &RequestDescriptor, dns: &DnsCache) -> bool {
        if self.deferred.contains_key(&desc.id.0) {
            return false;
        }
        let Some(host) = desc.url.host_str() else {
            return false;
        };
        if DnsCache::is_ip(host) {
            return false;
        }

        let cached = dns.cached(host);
        let stale = cached.as_ref().map_or(true, |entry| entry.is_expired());
        if !(stale || desc.load_flags.cache_busting()) {
            return false;
        }

        if cached.is_some() {
            dns.evict(host);
        }
        self.deferred.insert(desc.id.0, ());
        debug!(host = %host, uri = %desc.url, "repeating rule checks after dns refresh");
        true
    }

    pub fn mark_deferred(&self, id: RequestId) {
        self.deferred.insert(id.0, ());
    }

    pub fn is_deferred(&self, id: RequestId) -> bool {
        self.deferred.contains_key(&id.0)
    }

    pub fn clear_deferred(&self, id: RequestId) {
        self.deferred.remove(&id.0);
    }
}
