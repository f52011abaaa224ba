//! HTTPS enforcement integration tests: forced lists plus the
//! strict-transport store.

use http::header::STRICT_TRANSPORT_SECURITY;
use http::{HeaderMap, HeaderValue};
use trustnet::https::{HttpsEnforcer, StsStore};
use trustnet::sites::{AddressMatcher, WildcardDepth};
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn matcher(text: &str) -> AddressMatcher {
    let (m, errors) = AddressMatcher::compile(text, WildcardDepth::One);
    assert!(errors.is_empty());
    m
}

#[test]
fn test_seeded_hosts_upgrade_out_of_the_box() {
    let enforcer = HttpsEnforcer::new();

    assert!(enforcer.must_force(&url("http://paypal.com/")));
    assert!(enforcer.must_force(&url("http://www.paypal.com/")));
    assert!(enforcer.must_force(&url("http://github.com/")));
    assert!(!enforcer.must_force(&url("http://example.com/")));
}

#[test]
fn test_forced_list_rewrites_in_place() {
    let mut enforcer = HttpsEnforcer::with_sts(StsStore::new());
    enforcer.set_forced(matcher("bank.example *.shop.example"));

    let mut target = url("http://bank.example/login?next=/account");
    assert!(enforcer.force(&mut target));
    assert_eq!(target.as_str(), "https://bank.example/login?next=/account");

    let mut wild = url("http://www.shop.example/cart");
    assert!(enforcer.force(&mut wild));
    assert_eq!(wild.scheme(), "https");

    let mut other = url("http://other.example/");
    assert!(!enforcer.force(&mut other));
    assert_eq!(other.scheme(), "http");
}

#[test]
fn test_exceptions_cut_holes_in_forced_list() {
    let mut enforcer = HttpsEnforcer::with_sts(StsStore::new());
    enforcer.set_forced(matcher("bank.example"));
    enforcer.set_exceptions(matcher("http://bank.example/healthcheck*"));

    assert!(!enforcer.must_force(&url("http://bank.example/healthcheck/ping")));
    assert!(enforcer.must_force(&url("http://bank.example/login")));
}

#[test]
fn test_sts_header_full_lifecycle() {
    let enforcer = HttpsEnforcer::with_sts(StsStore::new());
    let mut headers = HeaderMap::new();
    headers.insert(
        STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // only a secure response may grant strict transport
    enforcer.process_response_headers(&url("http://mail.example/"), &headers);
    assert!(!enforcer.must_force(&url("http://mail.example/")));

    enforcer.process_response_headers(&url("https://mail.example/"), &headers);
    assert!(enforcer.must_force(&url("http://mail.example/")));
    assert!(enforcer.must_force(&url("http://imap.mail.example/")));

    // max-age=0 revokes the grant
    let mut revoke = HeaderMap::new();
    revoke.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static("max-age=0"));
    enforcer.process_response_headers(&url("https://mail.example/"), &revoke);
    assert!(!enforcer.must_force(&url("http://mail.example/")));
}

#[test]
fn test_subdomain_grants_require_the_flag() {
    let store = StsStore::new();
    store.seed("narrow.example", false);
    store.seed("wide.example", true);

    assert!(store.is_sts_host("narrow.example"));
    assert!(!store.is_sts_host("login.narrow.example"));
    assert!(store.is_sts_host("login.wide.example"));
    assert!(store.is_sts_host("a.b.wide.example"));
}

#[test]
fn test_force_preserves_everything_but_the_scheme() {
    let enforcer = HttpsEnforcer::with_sts(StsStore::new());
    enforcer.sts().seed("app.example", false);

    let mut target = url("http://app.example/deep/path?q=1&r=2#frag");
    assert!(enforcer.force(&mut target));
    assert_eq!(target.as_str(), "https://app.example/deep/path?q=1&r=2#frag");

    // idempotent on an already-secure target
    assert!(!enforcer.force(&mut target));
    assert_eq!(target.scheme(), "https");
}
