//! Ordered site-pattern collections with cascade-aware removal.
//!
//! A [`PolicySet`] holds trust-list entries: exact sites, bare domains,
//! `*.` host wildcards, port wildcards (`:0`) and bare IPv4 prefixes.
//! Matching cascades from an entry down to the sites it covers; removal
//! can be punctual (exact entry only) or cascade upward to covering
//! ancestor entries and downward to more specific descendant entries.
//! Temporary-grant bookkeeping depends on punctual removal reversing
//! itself exactly, without collaterally deleting grants layered above
//! or below the removed entry.

use std::collections::BTreeSet;

use crate::sites::site::{self, WildcardDepth};

#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    entries: BTreeSet<String>,
    depth: WildcardDepth,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(depth: WildcardDepth) -> Self {
        Self {
            entries: BTreeSet::new(),
            depth,
        }
    }

    /// Parses a whitespace/comma-delimited persisted list.
    pub fn from_persisted(text: &str, depth: WildcardDepth) -> Self {
        let mut set = Self::with_depth(depth);
        set.add_list(text);
        set
    }

    pub fn set_depth(&mut self, depth: WildcardDepth) {
        self.depth = depth;
    }

    pub fn depth(&self) -> WildcardDepth {
        self.depth
    }

    /// Adds one entry; returns whether the set changed.
    pub fn add(&mut self, entry: &str) -> bool {
        let key = canon(entry);
        if key.is_empty() {
            return false;
        }
        self.entries.insert(key)
    }

    pub fn add_all<I, S>(&mut self, entries: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = false;
        for entry in entries {
            changed |= self.add(entry.as_ref());
        }
        changed
    }

    /// Adds every token of a delimited list.
    pub fn add_list(&mut self, text: &str) -> bool {
        let mut changed = false;
        for token in site::split_list(text) {
            changed |= self.add(token);
        }
        changed
    }

    /// Removes a site from the set.
    ///
    /// The exact entry always goes. Unless `keep_ancestors`, every entry
    /// covering the site from above (bare-domain ancestors, wildcards,
    /// port wildcards, IP prefixes) goes too; unless `keep_descendants`,
    /// every strictly more specific entry below the site goes as well.
    /// Punctual removal passes both flags true.
    pub fn remove(&mut self, site: &str, keep_ancestors: bool, keep_descendants: bool) -> bool {
        let key = canon(site);
        if key.is_empty() {
            return false;
        }
        let mut changed = self.entries.remove(&key);
        if !keep_ancestors {
            for probe in covering_entries(&key, self.depth) {
                changed |= self.entries.remove(&probe);
            }
        }
        if !keep_descendants {
            let victims: Vec<String> = self
                .entries
                .iter()
                .filter(|e| is_descendant(e, &key))
                .cloned()
                .collect();
            for victim in victims {
                self.entries.remove(&victim);
                changed = true;
            }
        }
        changed
    }

    pub fn remove_all<I, S>(&mut self, sites: I, keep_ancestors: bool, keep_descendants: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = false;
        for s in sites {
            changed |= self.remove(s.as_ref(), keep_ancestors, keep_descendants);
        }
        changed
    }

    /// Whether any entry covers the given site.
    pub fn matches(&self, site: &str) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let key = canon(site);
        if key.is_empty() {
            return false;
        }
        if self.entries.contains(&key) {
            return true;
        }
        covering_entries(&key, self.depth)
            .iter()
            .any(|probe| self.entries.contains(probe))
    }

    /// Exact-entry lookup, no cascade.
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(&canon(entry))
    }

    /// Entry-wise equality; wildcard depth does not participate.
    pub fn equals(&self, other: &PolicySet) -> bool {
        self.entries == other.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sorted, space-joined wire form.
    pub fn to_persisted(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(entry);
        }
        out
    }
}

/// Reduces an entry or site to its canonical stored form: lowercase,
/// path stripped, `scheme://host[:port]` shape preserved.
fn canon(site: &str) -> String {
    let trimmed = site.trim().to_ascii_lowercase();
    let parts = site::split_spec(&trimmed);
    if parts.host.is_empty() {
        return trimmed;
    }
    let mut key = String::new();
    if let Some(scheme) = parts.scheme {
        key.push_str(scheme);
        key.push_str("://");
    }
    key.push_str(parts.host);
    if let Some(port) = parts.port {
        key.push(':');
        key.push_str(port);
    }
    key
}

/// Entry strings that would cover `key` from above, in lookup order.
fn covering_entries(key: &str, depth: WildcardDepth) -> Vec<String> {
    let parts = site::split_spec(key);
    let host = parts.host;
    let mut probes = Vec::new();
    if host.is_empty() {
        return probes;
    }

    if let Some(scheme) = parts.scheme {
        probes.push(format!("{scheme}://{host}:0"));
    }
    if let Some(port) = parts.port {
        probes.push(format!("{host}:{port}"));
        probes.push(format!("{host}:0"));
    }
    probes.push(host.to_string());

    let numeric = site::is_ipv4_literal(host) || site::ipv4_prefix_len(host).is_some();
    if !numeric {
        let labels: Vec<&str> = host.split('.').collect();
        // bare-domain ancestors need at least two labels of their own
        for i in 1..labels.len() {
            if labels.len() - i >= 2 {
                probes.push(labels[i..].join("."));
            }
        }
        for i in 1..labels.len() {
            let suffix = labels[i..].join(".");
            probes.push(format!("*.{suffix}"));
            if let Some(scheme) = parts.scheme {
                probes.push(format!("{scheme}://*.{suffix}"));
                probes.push(format!("{scheme}://*.{suffix}:0"));
                if let Some(port) = parts.port {
                    probes.push(format!("{scheme}://*.{suffix}:{port}"));
                }
            }
            if depth == WildcardDepth::One {
                break;
            }
        }
    } else if site::is_ipv4_literal(host) {
        let octets: Vec<&str> = host.split('.').collect();
        for take in [3, 2] {
            let prefix = octets[..take].join(".");
            probes.push(prefix.clone());
            if let Some(scheme) = parts.scheme {
                probes.push(format!("{scheme}://{prefix}"));
            }
        }
    }
    probes
}

/// Whether `entry` is strictly more specific than the removed `key`.
fn is_descendant(entry: &str, key: &str) -> bool {
    let kp = site::split_spec(key);
    let ep = site::split_spec(entry);
    if kp.host.is_empty() || ep.host.is_empty() {
        return false;
    }
    let entry_wild = ep.host.starts_with("*.");
    let ehost = ep.host.strip_prefix("*.").unwrap_or(ep.host);
    let khost = kp.host.strip_prefix("*.").unwrap_or(kp.host);

    // scheme and port must not conflict when both sides pin them
    if let (Some(ks), Some(es)) = (kp.scheme, ep.scheme) {
        if ks != es {
            return false;
        }
    }
    if let (Some(kport), Some(eport)) = (kp.port, ep.port) {
        if kport != eport {
            return false;
        }
    }

    // numeric hosts nest by leading octets, not by label suffix
    if site::ipv4_prefix_len(khost).is_some() {
        let nested = ehost.starts_with(&format!("{khost}."))
            && (site::is_ipv4_literal(ehost) || site::ipv4_prefix_len(ehost).is_some());
        return nested;
    }
    if site::is_ipv4_literal(khost) || site::is_ipv4_literal(ehost) {
        if ehost != khost {
            return false;
        }
    } else if ehost != khost {
        return ehost.ends_with(&format!(".{khost}"));
    }

    // same host: the entry must add qualification the key lacks
    (kp.scheme.is_none() && ep.scheme.is_some())
        || (kp.port.is_none() && ep.port.is_some())
        || (entry_wild && !kp.host.starts_with("*."))
}
