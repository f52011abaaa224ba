//! Cookie records, the embedder store view and secure-cookie
//! enforcement.
//!
//! # Architecture
//!
//! This area mirrors the cookie half of NoScript's HTTPS module:
//!
//! | NoScript (JS) | trustnet (Rust) | Responsibility |
//! |---------------|-----------------|----------------|
//! | `Cookie` wrapper | [`TrackedCookie`](record::TrackedCookie) | One `Set-Cookie` line with identity and scope |
//! | `nsICookieService` view | [`CookieJar`](jar::CookieJar) | The embedder's store as the guard sees it |
//! | `HTTPS.handleSecureCookies` | [`CookieSecurityGuard`](guard::CookieSecurityGuard) | Classification, patching, cross-site rewrites |
//!
//! The guard never talks to a real network stack: the embedder feeds
//! it response headers and applies whatever the guard rewrote.

pub mod guard;
pub mod jar;
pub mod record;
pub mod suffix;

pub use guard::{CookiePatchOutcome, CookieScope, CookieSecurityGuard};
pub use jar::CookieJar;
pub use record::TrackedCookie;
