//! Transport-upgrade enforcement.
//!
//! NoScript mapping:
//!
//! | NoScript (JS)        | trustnet (Rust)      | Responsibility                      |
//! |----------------------|----------------------|-------------------------------------|
//! | `STS` module         | [`sts::StsStore`]    | strict-transport grants per host    |
//! | `HTTPS.forceURI`     | [`enforcer::HttpsEnforcer`] | http→https rewriting of targets |
//!
//! The cookie side of `HTTPS.js` lives in [`crate::cookies::guard`].

pub mod enforcer;
pub mod sts;

pub use enforcer::HttpsEnforcer;
pub use sts::{StsEntry, StsStore};
