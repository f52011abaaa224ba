//! End-to-end lifecycle tests: content gate, request start, redirect
//! hops and teardown through the engine surface.

use std::net::{IpAddr, Ipv4Addr};
use time::Duration;

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use trustnet::base::error::PolicyError;
use trustnet::base::status::RequestStatus;
use trustnet::cookies::record::TrackedCookie;
use trustnet::engine::{Decision, Engine};
use trustnet::request::{ContentKind, ContentRequest, ContextId, LoadFlags, RequestDescriptor, RequestId};
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn script_request(target: &str, origin: &str) -> ContentRequest {
    let mut r = ContentRequest::new(ContentKind::Script, url(target));
    r.origin = Some(url(origin));
    r
}

#[test]
fn test_script_load_full_lifecycle() {
    let mut engine = Engine::new();
    engine.set_trust("https://app.example", true, false);

    let request = script_request("https://app.example/main.js", "https://app.example/");
    assert!(engine.begin_content_check(&request).is_allowed());
    assert_eq!(engine.lifecycle().states().pending_len(), 1);

    let desc = RequestDescriptor::new(RequestId(1), request.url.clone(), ContentKind::Script);
    engine.on_request_start(&desc).unwrap();
    assert_eq!(engine.lifecycle().states().pending_len(), 0);
    assert_eq!(engine.lifecycle().states().live(), 1);

    engine.on_request_stop(RequestId(1), &desc.url, RequestStatus::Ok);
    assert_eq!(engine.lifecycle().states().live(), 0);
    assert_eq!(
        engine.lifecycle().states().attach_count(),
        engine.lifecycle().states().detach_count()
    );
}

#[test]
fn test_blocked_script_never_parks_state() {
    let engine = Engine::new();
    let request = script_request("https://tracker.example/t.js", "https://page.example/");

    assert!(!engine.begin_content_check(&request).is_allowed());
    assert_eq!(engine.lifecycle().states().pending_len(), 0);
    assert_eq!(engine.recently_blocked(), vec!["https://tracker.example"]);
}

#[test]
fn test_redirect_upgraded_then_revalidated() {
    let mut engine = Engine::new();
    engine.set_trust("https://app.example", true, false);
    engine.set_trust("https://cdn.example", true, false);
    engine.enforcer().sts().seed("cdn.example", false);

    let request = script_request("https://app.example/lib.js", "https://app.example/");
    assert!(engine.begin_content_check(&request).is_allowed());

    let desc = RequestDescriptor::new(RequestId(2), request.url.clone(), ContentKind::Script);
    engine.on_request_start(&desc).unwrap();

    // the redirect target arrives plaintext; forcing runs before the
    // re-decision, so the verdict applies to the https twin
    let mut target = url("http://cdn.example/lib.js");
    let mut headers = HeaderMap::new();
    engine
        .on_request_redirect(&desc, &mut target, None, LoadFlags::empty(), &mut headers)
        .unwrap();
    assert_eq!(target.as_str(), "https://cdn.example/lib.js");
    assert_eq!(engine.lifecycle().states().pending_len(), 1);
}

#[test]
fn test_subresource_redirects_recorded_per_document() {
    let mut engine = Engine::new();
    engine.set_trust("https://app.example", true, false);
    engine.set_trust("https://cdn.example", true, false);

    let request = script_request("https://app.example/lib.js", "https://app.example/");
    assert!(engine.begin_content_check(&request).is_allowed());

    let mut desc = RequestDescriptor::new(RequestId(3), request.url.clone(), ContentKind::Script);
    desc.context = Some(ContextId(7));
    desc.document_url = Some(url("https://app.example/page"));
    engine.on_request_start(&desc).unwrap();

    let mut target = url("https://cdn.example/lib.js");
    let mut headers = HeaderMap::new();
    engine
        .on_request_redirect(&desc, &mut target, None, LoadFlags::empty(), &mut headers)
        .unwrap();

    let recorded = engine
        .lifecycle()
        .redirects()
        .for_document(ContextId(7), "https://app.example/page");
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].site, "https://cdn.example");
    assert_eq!(recorded[0].kind, ContentKind::Script);
}

#[test]
fn test_late_frame_check_on_subframe_documents() {
    let mut engine = Engine::new();
    let mut config = engine.config().clone();
    config.forbid_iframes = true;
    engine.apply_config(config);

    // the pre-gate sees a plain document load and waves it through
    let mut request = ContentRequest::new(ContentKind::Document, url("https://widgets.example/frame"));
    request.origin = Some(url("https://host.example/page"));
    assert!(engine.begin_content_check(&request).is_allowed());

    // at start time the target window turns out to be a subframe
    let mut desc = RequestDescriptor::new(RequestId(4), request.url.clone(), ContentKind::Document);
    desc.load_flags = LoadFlags::DOCUMENT_URI;
    desc.subframe = true;
    desc.origin = request.origin.clone();

    let err = engine.on_request_start(&desc).unwrap_err();
    assert!(matches!(
        err,
        PolicyError::ContentBlocked { kind: ContentKind::Subdocument, .. }
    ));
    assert!(engine
        .recently_blocked()
        .contains(&"https://widgets.example".to_owned()));
}

#[test]
fn test_dns_rebinding_recheck_cycle() {
    let engine = Engine::new();
    let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

    // fresh cache entry: resolution is not suspicious
    engine
        .dns()
        .record("api.example", vec![addr], Duration::seconds(300));
    let desc = RequestDescriptor::new(
        RequestId(5),
        url("https://api.example/data"),
        ContentKind::Xhr,
    );
    assert!(!engine.on_dns_resolving(&desc));

    // expired entry: one recheck per request, not a storm
    engine
        .dns()
        .record("api.example", vec![addr], Duration::seconds(-1));
    assert!(engine.on_dns_resolving(&desc));
    assert!(!engine.on_dns_resolving(&desc));

    // the resolver lands and repopulates the cache, then the request
    // still fails: the refreshed mapping gets poisoned, not reused
    engine
        .dns()
        .record("api.example", vec![addr], Duration::seconds(300));
    engine.on_request_stop(RequestId(5), &desc.url, RequestStatus::UnknownHost);
    let entry = engine.dns().cached("api.example").unwrap();
    assert!(entry.invalid);
    assert!(entry.is_expired());
}

#[test]
fn test_cross_scheme_navigation_recycles_tab_cookies() {
    let mut engine = Engine::new();
    let mut config = engine.config().clone();
    config.secure_cookies = true;
    config.secure_cookies_per_tab = true;
    config.secure_cookies_recycle = true;
    engine.apply_config(config);

    let tab = Some(ContextId(9));
    let page = url("https://bank.example/login");
    let mut response = HeaderMap::new();
    response.append(SET_COOKIE, HeaderValue::from_static("sid=1"));
    engine.on_response_headers(&page, &mut response, tab);
    let patched = response.get(SET_COOKIE).unwrap().to_str().unwrap();
    engine
        .guard()
        .jar()
        .save(&TrackedCookie::parse(patched, "bank.example"));

    let mut headers = HeaderMap::new();
    let rewritten = engine.on_cross_site_navigation(
        &url("http://bank.example/"),
        "https://bank.example/login",
        &mut headers,
        tab,
    );
    assert!(rewritten);
    assert_eq!(headers.get(COOKIE).unwrap().to_str().unwrap(), "sid=1");
}

#[test]
fn test_dispose_clears_session_state() {
    let mut engine = Engine::new();
    engine.set_trust("https://temp.example", true, true);
    engine.allow_object("https://media.example/movie.swf", "*");
    assert!(engine.js_status("https://temp.example"));

    engine.dispose();
    assert!(!engine.js_status("https://temp.example"));
    assert!(!engine.is_object_allowed(
        "https://media.example/movie.swf",
        "video/mp4",
        "https://media.example"
    ));
}

#[test]
fn test_decisions_are_pure_queries() {
    let mut engine = Engine::new();
    engine.set_trust("https://app.example", true, false);
    let request = script_request("https://app.example/a.js", "https://app.example/");

    // should_allow never parks state; only begin_content_check does
    assert_eq!(engine.should_allow(&request), Decision::Allow);
    assert_eq!(engine.lifecycle().states().pending_len(), 0);
}
