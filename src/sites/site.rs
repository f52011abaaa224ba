//! Site-key canonicalization and host string helpers.
//!
//! A site key is the canonical `scheme://host[:port]` string used as the
//! trust-decision boundary. Default ports are never printed, so two
//! distinct network origins never collapse into the same key. Schemes
//! without an authority (`about:`, `data:`) canonicalize to `scheme:`.

use serde::{Deserialize, Serialize};
use url::Url;

/// Canonical site key for a parsed URL.
pub fn site_of(url: &Url) -> String {
    match url.host_str() {
        Some(host) => match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        },
        None => format!("{}:", url.scheme()),
    }
}

/// Lenient front door for raw specs, list entries, and bare hosts.
///
/// Full URLs are parsed and reduced to their site; authority-less specs
/// reduce to `scheme:`; anything else is treated as a bare host token
/// with any path stripped.
pub fn site_from_str(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains("://") {
        return Url::parse(s).ok().map(|u| site_of(&u));
    }
    if let Some(idx) = s.find(':') {
        let (scheme, rest) = (&s[..idx], &s[idx + 1..]);
        let numeric_port = rest.chars().next().is_some_and(|c| c.is_ascii_digit());
        if !numeric_port && is_scheme(scheme) {
            return Some(format!("{}:", scheme.to_ascii_lowercase()));
        }
    }
    let bare = s
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or(s);
    Some(bare.to_ascii_lowercase())
}

/// Loosely decomposed address spec. Any of a full URL, a site key, a
/// `host:port` pair, or a bare host splits into these parts; fields the
/// input does not carry stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SpecParts<'a> {
    pub scheme: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<&'a str>,
    pub path: Option<&'a str>,
}

pub(crate) fn split_spec(s: &str) -> SpecParts<'_> {
    let (scheme, rest) = match s.find("://") {
        Some(i) if is_scheme(&s[..i]) => (Some(&s[..i]), &s[i + 3..]),
        _ => (None, s),
    };
    let (authority, path) = match rest.find(|c| c == '/' || c == '?' || c == '#') {
        Some(i) => (&rest[..i], Some(&rest[i..])),
        None => (rest, None),
    };
    let (host, port) = split_host_port(authority);
    SpecParts {
        scheme,
        host,
        port,
        path,
    }
}

/// Splits a trailing `:port` off an authority. Bracketed IPv6 literals
/// keep their brackets, matching `Url::host_str`.
pub(crate) fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if let Some(end) = authority.strip_prefix('[').and_then(|_| authority.find(']')) {
        let rest = &authority[end + 1..];
        if let Some(port) = rest.strip_prefix(':') {
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                return (&authority[..=end], Some(port));
            }
        }
        return (&authority[..=end], None);
    }
    match authority.rfind(':') {
        Some(i) => {
            let port = &authority[i + 1..];
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                (&authority[..i], Some(port))
            } else {
                (authority, None)
            }
        }
        None => (authority, None),
    }
}

/// The site with any explicit port removed.
pub fn strip_port(site: &str) -> &str {
    match explicit_port(site) {
        Some(port) => &site[..site.len() - port.len() - 1],
        None => site,
    }
}

/// The explicit port digits of a site key, if any.
pub fn explicit_port(site: &str) -> Option<&str> {
    let parts = split_spec(site);
    parts.port
}

pub(crate) fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

/// True for a 4-octet dotted IPv4 literal.
pub fn is_ipv4_literal(host: &str) -> bool {
    let mut count = 0;
    for label in host.split('.') {
        if label.is_empty() || label.len() > 3 || !label.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if label.parse::<u16>().map_or(true, |n| n > 255) {
            return false;
        }
        count += 1;
    }
    count == 4
}

/// For a bare leading-octet pattern like `192.168` or `10.0.0`, the
/// number of octets (2 or 3). Full literals and non-numeric hosts yield
/// `None`.
pub fn ipv4_prefix_len(s: &str) -> Option<usize> {
    let mut count = 0;
    for label in s.split('.') {
        if label.is_empty() || label.len() > 3 || !label.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if label.parse::<u16>().map_or(true, |n| n > 255) {
            return None;
        }
        count += 1;
    }
    if count == 2 || count == 3 {
        Some(count)
    } else {
        None
    }
}

/// How many extra labels a `*.` host wildcard swallows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WildcardDepth {
    /// `*.example.com` matches `a.example.com` but not `a.b.example.com`
    /// and never the bare `example.com`.
    #[default]
    One,
    /// One or more extra labels; still never the bare domain.
    Any,
}

/// Label-wildcard host matching: `host` against the suffix of a `*.`
/// pattern.
pub fn host_matches_wildcard(suffix: &str, host: &str, depth: WildcardDepth) -> bool {
    let Some(head) = host
        .strip_suffix(suffix)
        .and_then(|h| h.strip_suffix('.'))
    else {
        return false;
    };
    if head.is_empty() {
        return false;
    }
    match depth {
        WildcardDepth::One => !head.contains('.'),
        WildcardDepth::Any => true,
    }
}

/// Splits a persisted or preference-style list into tokens. Delimiters
/// are any run of whitespace and commas.
pub fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}
