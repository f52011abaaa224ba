//! # trustnet
//!
//! A NoScript-inspired content-security policy engine for Rust.
//!
//! `trustnet` implements the trust-decision core of a script-blocking
//! browser add-on as an embeddable library: per-site whitelists and
//! blacklists, content-type gates for scripts, plugins, frames and
//! scripted requests, https enforcement and secure-cookie management.
//!
//! ## Features
//!
//! - **Site Policy**: `scheme://host:port` identities with cascading
//!   wildcard matching and a mandatory always-on core
//! - **Content Gating**: per-kind verdicts for scripts, objects, media,
//!   fonts, frames and XHR, with click-to-load object grants
//! - **Request Lifecycle**: decision parking across start, redirect and
//!   stop, with redirect re-validation and DNS-driven rechecks
//! - **HTTPS Enforcement**: pattern-forced upgrades plus a
//!   strict-transport store seeded with known-good hosts
//! - **Cookie Hygiene**: `Secure` forcing over https and controlled
//!   recycling on cross-scheme navigation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trustnet::engine::{Decision, Engine};
//! use trustnet::request::{ContentKind, ContentRequest};
//! use url::Url;
//!
//! fn main() {
//!     let mut engine = Engine::new();
//!     engine.set_trust("https://app.example", true, false);
//!
//!     let mut request = ContentRequest::new(
//!         ContentKind::Script,
//!         Url::parse("https://cdn.example/lib.js").unwrap(),
//!     );
//!     request.origin = Some(Url::parse("https://app.example/").unwrap());
//!
//!     match engine.should_allow(&request) {
//!         Decision::Allow => println!("load it"),
//!         Decision::Block(reason) => println!("blocked: {reason:?}"),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core types and error definitions
//! - [`config`] - Engine configuration and persistence
//! - [`cookies`] - Cookie records, store view and secure-cookie guard
//! - [`dns`] - Resolution cache backing rebinding rechecks
//! - [`engine`] - The policy engine and its decision surface
//! - [`https`] - Transport upgrades and strict-transport grants
//! - [`request`] - Request descriptors and lifecycle coordination
//! - [`sites`] - Site identity, address patterns and policy sets
//! - [`trust`] - Trust registry and per-site enablement
//!
//! ## Security
//!
//! This library implements several protections from NoScript 2.x:
//! - Default-deny script execution outside the whitelist
//! - Embedding-context rules against cross-site framing
//! - Cross-site XHR gating in scripted contexts
//! - Forced `Secure` cookies to stop plaintext session leakage
//! - Redirect re-validation so a trusted load cannot be bounced to an
//!   untrusted one

pub mod base;
pub mod config;
pub mod cookies;
pub mod dns;
pub mod engine;
pub mod https;
pub mod request;
pub mod sites;
pub mod trust;
