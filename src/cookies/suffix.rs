//! Public-suffix checks guarding cookie and frame scope.
//!
//! A Domain attribute naming a public suffix (`com`, `co.uk`) would
//! otherwise scope a cookie across unrelated registrants. Uses
//! Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};

/// Whether the domain itself is a public suffix.
pub fn is_public_suffix(domain: &str) -> bool {
    let lower = domain.trim_start_matches('.').to_ascii_lowercase();
    match List.suffix(lower.as_bytes()) {
        Some(suffix) => suffix.as_bytes() == lower.as_bytes(),
        None => false,
    }
}

/// The registrable domain (eTLD+1) of a host, if it has one.
pub fn registrable_domain(host: &str) -> Option<String> {
    let lower = host.to_ascii_lowercase();
    List.domain(lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok().map(str::to_owned))
}

/// Whether two hosts share a registrable domain. Hosts without one
/// (IP literals, single labels) only match themselves.
pub fn same_base_domain(a: &str, b: &str) -> bool {
    match (registrable_domain(a), registrable_domain(b)) {
        (Some(da), Some(db)) => da == db,
        _ => a.eq_ignore_ascii_case(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_suffixes() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix(".com"));
        assert!(is_public_suffix("co.uk"));
        assert!(is_public_suffix("github.io"));
        assert!(!is_public_suffix("example.com"));
        assert!(!is_public_suffix("sub.example.com"));
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(
            registrable_domain("deep.sub.example.co.uk").as_deref(),
            Some("example.co.uk")
        );
        assert_eq!(registrable_domain("example.com").as_deref(), Some("example.com"));
        assert_eq!(registrable_domain("co.uk"), None);
    }

    #[test]
    fn test_same_base_domain() {
        assert!(same_base_domain("www.example.com", "cdn.example.com"));
        assert!(same_base_domain("example.com", "example.com"));
        assert!(!same_base_domain("example.com", "example.org"));
        assert!(!same_base_domain("a.co.uk", "b.co.uk"));
        assert!(same_base_domain("10.0.0.1", "10.0.0.1"));
        assert!(!same_base_domain("10.0.0.1", "10.0.0.2"));
    }
}
