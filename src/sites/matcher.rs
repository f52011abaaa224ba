//! Typed address-pattern matching for trust and exception lists.
//!
//! Preference-style pattern lists (forced hosts, exceptions, extra
//! whitelists) compile into an [`AddressMatcher`]: one alternation over
//! the lines that parsed, with per-line errors reported on a structured
//! channel instead of being swallowed by a regex engine. A list where
//! nothing parses becomes a matcher that matches nothing, so a malformed
//! preference can only ever narrow what is allowed.

use tracing::debug;

use crate::base::error::{PatternError, PatternErrorKind};
use crate::sites::site::{self, SpecParts, WildcardDepth};

/// One parsed pattern line.
///
/// Grammar: `[^] [scheme://] host [:port] [/path] [$]` where `host` is a
/// literal, a `*.suffix` label wildcard, or a bare 2-3 octet IPv4
/// prefix; port `0` matches any port; a `*` scheme matches any scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPattern {
    scheme: SchemeSpec,
    host: HostSpec,
    port: PortSpec,
    path: Option<String>,
    exact_path: bool,
    anchor_start: bool,
    anchor_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemeSpec {
    /// No scheme in the pattern: any input scheme, or none.
    Unspecified,
    /// `*://`: any scheme, but the input must carry one.
    Any,
    Exact(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostSpec {
    Exact(String),
    /// Suffix after `*.`; depth decided at match time.
    LabelWildcard(String),
    /// Leading IPv4 octets, stored dotted.
    IpPrefix(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortSpec {
    Unspecified,
    Any,
    Exact(u16),
}

impl AddressPattern {
    pub fn parse(line: &str) -> Result<Self, PatternErrorKind> {
        let mut s = line.trim();
        if s.is_empty() {
            return Err(PatternErrorKind::Empty);
        }
        let anchor_start = s.starts_with('^');
        if anchor_start {
            s = &s[1..];
        }
        let anchor_end = s.ends_with('$');
        if anchor_end {
            s = &s[..s.len() - 1];
        }
        if s.is_empty() {
            return Err(PatternErrorKind::Empty);
        }

        let star_scheme = s.strip_prefix("*://");
        let parts = site::split_spec(star_scheme.unwrap_or(s));
        let scheme = if star_scheme.is_some() {
            SchemeSpec::Any
        } else {
            match parts.scheme {
                Some(sch) => {
                    if !site::is_scheme(sch) {
                        return Err(PatternErrorKind::BadScheme);
                    }
                    SchemeSpec::Exact(sch.to_ascii_lowercase())
                }
                None => SchemeSpec::Unspecified,
            }
        };

        let raw_host = parts.host;
        if raw_host.is_empty() {
            return Err(PatternErrorKind::BadHost);
        }
        let host = if let Some(suffix) = raw_host.strip_prefix("*.") {
            if suffix.is_empty() || suffix.contains('*') {
                return Err(PatternErrorKind::BadWildcard);
            }
            if suffix.starts_with('.') || suffix.contains("..") {
                return Err(PatternErrorKind::BadHost);
            }
            HostSpec::LabelWildcard(suffix.to_ascii_lowercase())
        } else if raw_host.contains('*') {
            return Err(PatternErrorKind::BadWildcard);
        } else if site::ipv4_prefix_len(raw_host).is_some() {
            HostSpec::IpPrefix(raw_host.to_string())
        } else {
            if raw_host.starts_with('.')
                || raw_host.contains("..")
                || (raw_host.contains(':') && !raw_host.starts_with('['))
            {
                return Err(PatternErrorKind::BadHost);
            }
            HostSpec::Exact(raw_host.to_ascii_lowercase())
        };

        let port = match parts.port {
            None => PortSpec::Unspecified,
            Some("0") => PortSpec::Any,
            Some(p) => match p.parse::<u16>() {
                Ok(n) => PortSpec::Exact(n),
                Err(_) => return Err(PatternErrorKind::BadPort),
            },
        };

        let (path, exact_path) = match parts.path {
            None => (None, false),
            Some(p) => {
                let starred = p.ends_with('*');
                let prefix = if starred { &p[..p.len() - 1] } else { p };
                if prefix.contains('*') {
                    return Err(PatternErrorKind::BadWildcard);
                }
                (Some(prefix.to_string()), anchor_end && !starred)
            }
        };

        Ok(AddressPattern {
            scheme,
            host,
            port,
            path,
            exact_path,
            anchor_start,
            anchor_end,
        })
    }

    fn matches(&self, parts: &SpecParts<'_>, depth: WildcardDepth) -> bool {
        (match &self.scheme {
            SchemeSpec::Exact(s) => match parts.scheme {
                Some(input) => input.eq_ignore_ascii_case(s),
                None => false,
            },
            SchemeSpec::Any => parts.scheme.is_some(),
            SchemeSpec::Unspecified => !(self.anchor_start && parts.scheme.is_some()),
        }) && self.host_matches(parts.host, depth)
            && self.port_matches(parts)
            && self.path_matches(parts)
    }

    fn host_matches(&self, host: &str, depth: WildcardDepth) -> bool {
        match &self.host {
            HostSpec::Exact(h) => host.eq_ignore_ascii_case(h),
            HostSpec::LabelWildcard(suffix) => {
                site::host_matches_wildcard(suffix, &host.to_ascii_lowercase(), depth)
            }
            HostSpec::IpPrefix(prefix) => {
                site::is_ipv4_literal(host) && host.starts_with(&format!("{prefix}."))
            }
        }
    }

    fn port_matches(&self, parts: &SpecParts<'_>) -> bool {
        match self.port {
            PortSpec::Any => true,
            PortSpec::Exact(p) => parts.port.and_then(|s| s.parse::<u16>().ok()) == Some(p),
            PortSpec::Unspecified => {
                // an end anchor with nothing after the host forbids a port
                !(self.anchor_end && self.path.is_none() && parts.port.is_some())
            }
        }
    }

    fn path_matches(&self, parts: &SpecParts<'_>) -> bool {
        match &self.path {
            None => {
                if self.anchor_end {
                    matches!(parts.path, None | Some("") | Some("/"))
                } else {
                    true
                }
            }
            Some(prefix) => {
                let input = parts.path.unwrap_or("/");
                if self.exact_path {
                    input == prefix
                } else {
                    input.starts_with(prefix.as_str())
                }
            }
        }
    }
}

/// A compiled alternation of address patterns.
#[derive(Debug, Clone, Default)]
pub struct AddressMatcher {
    patterns: Vec<AddressPattern>,
    depth: WildcardDepth,
}

impl AddressMatcher {
    /// A matcher that matches nothing; the fallback for unparsable
    /// input.
    pub fn never() -> Self {
        Self::default()
    }

    /// Compiles a whitespace/comma-delimited pattern list. Lines that
    /// fail to parse are reported and skipped; the rest still match.
    pub fn compile(text: &str, depth: WildcardDepth) -> (Self, Vec<PatternError>) {
        let mut patterns = Vec::new();
        let mut errors = Vec::new();
        for (index, token) in site::split_list(text).enumerate() {
            match AddressPattern::parse(token) {
                Ok(p) => patterns.push(p),
                Err(reason) => {
                    debug!(pattern = token, %reason, "skipping unparsable address pattern");
                    errors.push(PatternError {
                        index,
                        line: token.to_string(),
                        reason,
                    });
                }
            }
        }
        (Self { patterns, depth }, errors)
    }

    /// All-or-nothing compile for callers that must not run with a
    /// partial list.
    pub fn compile_strict(text: &str, depth: WildcardDepth) -> Result<Self, PatternError> {
        let (matcher, mut errors) = Self::compile(text, depth);
        let result = match errors.drain(..).next() {
            Some(err) => Err(err),
            None => Ok(matcher),
        };
        result
    }

    /// Tests a full spec, a site key, or a bare host.
    pub fn test(&self, spec: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let parts = site::split_spec(spec);
        self.patterns.iter().any(|p| p.matches(&parts, self.depth))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> AddressMatcher {
        let (m, errors) = AddressMatcher::compile(text, WildcardDepth::One);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        m
    }

    #[test]
    fn test_literal_host() {
        let m = compile("example.com");
        assert!(m.test("example.com"));
        assert!(m.test("https://example.com"));
        assert!(m.test("https://example.com:8080/path"));
        assert!(!m.test("https://sub.example.com"));
        assert!(!m.test("https://notexample.com"));
    }

    #[test]
    fn test_scheme_pinned() {
        let m = compile("https://example.com");
        assert!(m.test("https://example.com/x"));
        assert!(!m.test("http://example.com"));
        assert!(!m.test("example.com"));
    }

    #[test]
    fn test_label_wildcard_one_level() {
        let m = compile("*.example.com");
        assert!(m.test("https://a.example.com"));
        assert!(!m.test("https://example.com"));
        assert!(!m.test("https://a.b.example.com"));
    }

    #[test]
    fn test_label_wildcard_any_depth() {
        let (m, errors) = AddressMatcher::compile("*.example.com", WildcardDepth::Any);
        assert!(errors.is_empty());
        assert!(m.test("https://a.example.com"));
        assert!(m.test("https://a.b.example.com"));
        assert!(!m.test("https://example.com"));
    }

    #[test]
    fn test_port_wildcard_and_exact() {
        let any = compile("https://example.com:0");
        assert!(any.test("https://example.com:8080"));
        assert!(any.test("https://example.com:9090"));
        assert!(any.test("https://example.com"));

        let exact = compile("https://example.com:8080");
        assert!(exact.test("https://example.com:8080/x"));
        assert!(!exact.test("https://example.com:9090"));
        assert!(!exact.test("https://example.com"));
    }

    #[test]
    fn test_ip_prefix() {
        let m = compile("192.168 10.0.0");
        assert!(m.test("http://192.168.1.5"));
        assert!(m.test("192.168.44.7:8080"));
        assert!(m.test("https://10.0.0.9/x"));
        assert!(!m.test("http://10.0.1.9"));
        assert!(!m.test("http://1921.68.1.5"));
        assert!(!m.test("http://192.168.example.com"));
    }

    #[test]
    fn test_path_prefix_and_star() {
        let m = compile("https://cdn.example.com/assets/*");
        assert!(m.test("https://cdn.example.com/assets/app.js"));
        assert!(!m.test("https://cdn.example.com/other/app.js"));
    }

    #[test]
    fn test_anchors() {
        let m = compile("^example.com$");
        assert!(m.test("example.com"));
        assert!(!m.test("https://example.com"));
        assert!(!m.test("example.com:8080"));
        assert!(!m.test("example.com/path"));

        let m = compile("https://example.com$");
        assert!(m.test("https://example.com"));
        assert!(m.test("https://example.com/"));
        assert!(!m.test("https://example.com/path"));
        assert!(!m.test("https://example.com:8080"));
    }

    #[test]
    fn test_bad_patterns_are_reported_not_fatal() {
        let (m, errors) = AddressMatcher::compile("good.com *bad*.com *.", WildcardDepth::One);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, "*bad*.com");
        assert_eq!(errors[0].reason, PatternErrorKind::BadWildcard);
        assert!(m.test("good.com"));
        assert!(!m.test("bad.com"));
    }

    #[test]
    fn test_fully_malformed_list_matches_nothing() {
        let (m, errors) = AddressMatcher::compile("*** :::", WildcardDepth::One);
        assert!(!errors.is_empty());
        assert!(m.is_empty());
        assert!(!m.test("anything.com"));
        assert!(!AddressMatcher::never().test("anything.com"));
    }

    #[test]
    fn test_any_scheme_star() {
        let m = compile("*://example.com");
        assert!(m.test("http://example.com"));
        assert!(m.test("https://example.com"));
        assert!(!m.test("example.com"));
    }
}
