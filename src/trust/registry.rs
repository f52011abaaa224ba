//! Central trust registry: the whitelist, the untrusted blacklist,
//! temporary grants and the enablement decision they produce.
//!
//! NoScript mapping: `Main.js` `jsPolicySites` / `untrustedSites` /
//! `manualSites` / `tempSites` / `gTempSites`, plus `isJSEnabled`,
//! `setJSEnabled`, `checkShorthands`, `autoTemp`, `mustCascadeTrust`,
//! `eraseTemp` and `getPermanentSites`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sites::matcher::AddressMatcher;
use crate::sites::policyset::PolicySet;
use crate::sites::site::{self, WildcardDepth};
use crate::trust::granularity::UntrustedGranularity;
use crate::trust::transport::TransportPolicy;

/// Per-docshell script toggle granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocshellJsMode {
    /// Never force a docshell's scripting off.
    Off,
    /// Scripting off only for blacklisted sites.
    #[default]
    BlockUntrusted,
    /// Scripting off for everything outside the whitelist.
    BlockNotWhitelisted,
}

impl From<u8> for DocshellJsMode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => DocshellJsMode::Off,
            2 => DocshellJsMode::BlockNotWhitelisted,
            _ => DocshellJsMode::BlockUntrusted,
        }
    }
}

/// Holds every trust list and answers the per-site enablement question.
///
/// The whitelist (`allowed`) always contains the mandatory sites. The
/// blacklist (`untrusted`) wins over the whitelist. `manual_deny`
/// records sites the user explicitly revoked, so automatic grants
/// never resurrect them. `temp` shadows which whitelist entries are
/// session-scoped; `global_temp` tracks grants made while the global
/// switch was on, which fold back into the blacklist on erase.
#[derive(Debug)]
pub struct TrustRegistry {
    allowed: PolicySet,
    untrusted: PolicySet,
    manual_deny: PolicySet,
    mandatory: PolicySet,
    temp: PolicySet,
    global_temp: PolicySet,
    extra_allow: AddressMatcher,
    global_allow: bool,
    block_untrusted_content: bool,
    auto_allow: bool,
    forbid_implies_untrust_pref: bool,
    ignore_ports: bool,
    granularity: UntrustedGranularity,
    transport: TransportPolicy,
    docshell_js: DocshellJsMode,
}

impl Default for TrustRegistry {
    fn default() -> Self {
        Self::new(WildcardDepth::One)
    }
}

impl TrustRegistry {
    pub fn new(depth: WildcardDepth) -> Self {
        Self {
            allowed: PolicySet::with_depth(depth),
            untrusted: PolicySet::with_depth(depth),
            manual_deny: PolicySet::with_depth(depth),
            mandatory: PolicySet::with_depth(depth),
            temp: PolicySet::with_depth(depth),
            global_temp: PolicySet::with_depth(depth),
            extra_allow: AddressMatcher::never(),
            global_allow: false,
            block_untrusted_content: true,
            auto_allow: false,
            forbid_implies_untrust_pref: false,
            ignore_ports: true,
            granularity: UntrustedGranularity::default(),
            transport: TransportPolicy::default(),
            docshell_js: DocshellJsMode::default(),
        }
    }

    pub fn allowed(&self) -> &PolicySet {
        &self.allowed
    }

    pub fn untrusted(&self) -> &PolicySet {
        &self.untrusted
    }

    pub fn manual_deny(&self) -> &PolicySet {
        &self.manual_deny
    }

    pub fn mandatory(&self) -> &PolicySet {
        &self.mandatory
    }

    pub fn temp(&self) -> &PolicySet {
        &self.temp
    }

    pub fn global_temp(&self) -> &PolicySet {
        &self.global_temp
    }

    pub fn global_allow(&self) -> bool {
        self.global_allow
    }

    pub fn granularity(&self) -> UntrustedGranularity {
        self.granularity
    }

    pub fn transport(&self) -> &TransportPolicy {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportPolicy {
        &mut self.transport
    }

    pub fn docshell_js(&self) -> DocshellJsMode {
        self.docshell_js
    }

    pub fn ignore_ports(&self) -> bool {
        self.ignore_ports
    }

    pub fn set_global_allow(&mut self, on: bool) {
        self.global_allow = on;
    }

    pub fn set_block_untrusted_content(&mut self, on: bool) {
        self.block_untrusted_content = on;
    }

    pub fn set_auto_allow(&mut self, on: bool) {
        self.auto_allow = on;
    }

    pub fn set_forbid_implies_untrust(&mut self, on: bool) {
        self.forbid_implies_untrust_pref = on;
    }

    pub fn set_ignore_ports(&mut self, on: bool) {
        self.ignore_ports = on;
    }

    pub fn set_granularity(&mut self, granularity: UntrustedGranularity) {
        self.granularity = granularity;
    }

    pub fn set_docshell_js(&mut self, mode: DocshellJsMode) {
        self.docshell_js = mode;
    }

    pub fn set_extra_allow(&mut self, matcher: AddressMatcher) {
        self.extra_allow = matcher;
    }

    /// Propagates a wildcard-depth change to every list.
    pub fn set_depth(&mut self, depth: WildcardDepth) {
        for set in [
            &mut self.allowed,
            &mut self.untrusted,
            &mut self.manual_deny,
            &mut self.mandatory,
            &mut self.temp,
            &mut self.global_temp,
        ] {
            set.set_depth(depth);
        }
    }

    /// Rebuilds the whitelist from a persisted list, re-adding the
    /// mandatory sites.
    pub fn load_allowed_list(&mut self, text: &str) {
        self.allowed = PolicySet::from_persisted(text, self.allowed.depth());
        let mandatory: Vec<String> = self.mandatory.iter().map(str::to_owned).collect();
        self.allowed.add_all(&mandatory);
    }

    pub fn load_untrusted_list(&mut self, text: &str) {
        self.untrusted = PolicySet::from_persisted(text, self.untrusted.depth());
    }

    /// Rebuilds the mandatory list; its sites join the whitelist and
    /// can never be delisted wholesale.
    pub fn load_mandatory_list(&mut self, text: &str) {
        self.mandatory = PolicySet::from_persisted(text, self.mandatory.depth());
        let sites: Vec<String> = self.mandatory.iter().map(str::to_owned).collect();
        self.allowed.add_all(&sites);
    }

    /// The core per-site scripting decision.
    ///
    /// With the global switch on, only blacklisted sites can be denied
    /// (and only while untrusted content is set to stay blocked). With
    /// it off, a site must be whitelisted, not blacklisted and not
    /// vetoed by its transport.
    pub fn is_js_enabled(&self, site: &str) -> bool {
        if self.global_allow {
            !(self.block_untrusted_content && self.untrusted.matches(site))
        } else {
            self.allowed.matches(site)
                && !self.untrusted.matches(site)
                && !self.transport.forbids(site)
        }
    }

    /// Auxiliary probes that extend the plain list decision: the extra
    /// allow patterns, port-insensitive retry, explicit port-wildcard
    /// keys and bare IPv4 prefixes.
    pub fn check_shorthands(&self, site: &str) -> bool {
        if self.extra_allow.test(site) {
            return true;
        }
        if let Some(port) = site::explicit_port(site) {
            if self.ignore_ports {
                if self.is_js_enabled(site::strip_port(site)) {
                    return true;
                }
            } else if self.ported_shorthands(site, port) {
                return true;
            }
        }
        self.ip_shorthand(site)
    }

    /// Effective enablement as surfaced to the user: the list decision
    /// plus every shorthand.
    pub fn js_status(&self, site: &str) -> bool {
        self.is_js_enabled(site) || self.check_shorthands(site)
    }

    fn ported_shorthands(&self, site: &str, port: &str) -> bool {
        let zero_key = format!("{}:0", site::strip_port(site));
        if self.allowed.contains(&zero_key) || self.allowed.contains(site) {
            return true;
        }
        // nth-level host wildcards only make sense on web schemes
        let parts = site::split_spec(site);
        let scheme = match parts.scheme {
            Some(s @ ("http" | "https")) => s,
            _ => return false,
        };
        let labels: Vec<&str> = parts.host.split('.').collect();
        for i in 1..labels.len().saturating_sub(1) {
            let suffix = labels[i..].join(".");
            let ported = format!("{scheme}://*.{suffix}:{port}");
            let wild = format!("{scheme}://*.{suffix}:0");
            if self.allowed.contains(&ported) || self.allowed.contains(&wild) {
                return true;
            }
        }
        false
    }

    /// Leftmost IPv4 prefixes, bare or scheme-qualified, probed as
    /// exact whitelist keys.
    fn ip_shorthand(&self, site: &str) -> bool {
        let parts = site::split_spec(site);
        let scheme = match parts.scheme {
            Some(s @ ("http" | "https")) => s,
            _ => return false,
        };
        if !site::is_ipv4_literal(parts.host) {
            return false;
        }
        let octets: Vec<&str> = parts.host.split('.').collect();
        let first3 = octets[..3].join(".");
        let first2 = octets[..2].join(".");
        self.allowed.contains(&first3)
            || self.allowed.contains(&first2)
            || self.allowed.contains(&format!("{scheme}://{first3}"))
            || self.allowed.contains(&format!("{scheme}://{first2}"))
    }

    pub fn is_untrusted(&self, site: &str) -> bool {
        self.untrusted.matches(site)
    }

    pub fn is_manual(&self, site: &str) -> bool {
        self.manual_deny.matches(site)
    }

    pub fn is_mandatory(&self, site: &str) -> bool {
        !site.is_empty() && self.mandatory.matches(site)
    }

    /// Whether the site's grant is session-scoped. Exact entry lookup:
    /// the shadow lists never cascade.
    pub fn is_temp(&self, site: &str) -> bool {
        if self.global_allow {
            self.global_temp.contains(site)
        } else {
            self.temp.contains(site)
        }
    }

    /// Revoking trust blacklists instead of merely delisting whenever
    /// the global switch or automatic grants could re-enable the site.
    pub fn forbid_implies_untrust(&self) -> bool {
        self.global_allow || self.auto_allow || self.forbid_implies_untrust_pref
    }

    /// Grants or revokes trust for one site.
    ///
    /// `from_scratch` resets the whitelist to the mandatory sites
    /// first. Granting delists the site from the blacklist, cascading
    /// through blacklisted descendants when `cascade` is set, and
    /// clears its manual-deny mark. Revoking removes the site and its
    /// covering ancestors from the whitelist, then records the veto on
    /// the blacklist or the manual-deny list depending on
    /// [`forbid_implies_untrust`](Self::forbid_implies_untrust).
    pub fn set_trust(&mut self, site: &str, allow: bool, from_scratch: bool, cascade: bool) -> bool {
        let mut changed = false;
        if from_scratch {
            changed = !self.allowed.equals(&self.mandatory);
            self.allowed = self.mandatory.clone();
        }
        if allow {
            changed |= self.allowed.add(site);
            if !from_scratch {
                changed |= self.untrusted.remove(site, false, !cascade);
                changed |= self.manual_deny.remove(site, true, false);
            }
        } else {
            changed |= self.allowed.remove(site, false, true);
            changed |= if self.forbid_implies_untrust() {
                self.untrusted.add(site)
            } else {
                self.manual_deny.add(site)
            };
        }
        if changed {
            debug!(site = %site, allow, from_scratch, cascade, "trust updated");
        }
        changed
    }

    pub fn set_trust_many<I, S>(&mut self, sites: I, allow: bool, from_scratch: bool, cascade: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = from_scratch && self.set_trust_reset();
        for site in sites {
            changed |= self.set_trust(site.as_ref(), allow, false, cascade);
        }
        changed
    }

    fn set_trust_reset(&mut self) -> bool {
        let changed = !self.allowed.equals(&self.mandatory);
        self.allowed = self.mandatory.clone();
        changed
    }

    /// Marks or unmarks a whitelist entry as session-scoped. Removal is
    /// punctual on both shadow lists, see [`erase_temp`](Self::erase_temp).
    pub fn set_temp(&mut self, site: &str, on: bool) -> bool {
        let mut changed = false;
        if on {
            changed |= self.temp.add(site);
            if self.global_allow {
                changed |= self.global_temp.add(site);
            }
        } else {
            changed |= self.temp.remove(site, true, true);
            changed |= self.global_temp.remove(site, true, true);
        }
        changed
    }

    pub fn set_untrusted(&mut self, site: &str, on: bool) -> bool {
        if on {
            self.untrusted.add(site)
        } else {
            self.untrusted.remove(site, false, true)
        }
    }

    pub fn set_manual(&mut self, site: &str, on: bool) -> bool {
        if on {
            self.manual_deny.add(site)
        } else {
            self.manual_deny.remove(site, true, false)
        }
    }

    /// Grants temporary trust to a site nobody has decided on yet.
    /// Blacklisted, manually vetoed and already-enabled sites are left
    /// alone.
    pub fn auto_temp(&mut self, site: &str) -> bool {
        if self.is_untrusted(site) || self.is_manual(site) || self.is_js_enabled(site) {
            return false;
        }
        self.set_temp(site, true);
        self.set_trust(site, true, false, false);
        debug!(site = %site, "auto-granted temporary trust");
        true
    }

    /// Whether granting trust to this site must delist its blacklisted
    /// descendants, per the configured granularity.
    pub fn must_cascade_trust(&self, site: &str, temporary: bool) -> bool {
        self.granularity.cascades(temporary, self.is_untrusted(site))
    }

    /// Multi-site variant: the single-target delisting bit never fires.
    pub fn must_cascade_trust_many(&self, temporary: bool) -> bool {
        self.granularity.cascades(temporary, false)
    }

    /// Drops every session-scoped grant.
    ///
    /// Temporary entries leave the whitelist punctually, so permanent
    /// grants above or below them survive. Grants made while the
    /// global switch was on return to the blacklist. Mandatory sites
    /// are re-granted at the end.
    pub fn erase_temp(&mut self) {
        let temps: Vec<String> = self.temp.iter().map(str::to_owned).collect();
        for s in &temps {
            self.allowed.remove(s, true, true);
        }
        let gtemps: Vec<String> = self.global_temp.iter().map(str::to_owned).collect();
        for s in &gtemps {
            self.untrusted.add(s);
        }
        self.temp.clear();
        self.global_temp.clear();
        let mandatory: Vec<String> = self.mandatory.iter().map(str::to_owned).collect();
        for s in &mandatory {
            self.set_trust(s, true, false, false);
        }
        debug!(
            erased = temps.len(),
            re_blacklisted = gtemps.len(),
            "temporary grants erased"
        );
    }

    /// The whitelist minus session-scoped entries, for persistence.
    pub fn permanent_sites(&self) -> PolicySet {
        let mut whitelist = self.allowed.clone();
        for s in self.temp.iter() {
            whitelist.remove(s, true, true);
        }
        whitelist
    }

    /// Whether a docshell rooted at `site` may keep scripting on.
    pub fn docshell_js_allowed(&self, site: &str) -> bool {
        match self.docshell_js {
            DocshellJsMode::Off => true,
            DocshellJsMode::BlockUntrusted => !self.is_untrusted(site),
            DocshellJsMode::BlockNotWhitelisted => self.js_status(site),
        }
    }
}
