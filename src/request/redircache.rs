//! Redirect provenance per document, plus the recently-blocked site log.
//!
//! Sub-resource redirects land on sites the page never named directly.
//! The redirect cache records them per top document so later policy UI
//! (menus, per-site toggles) can reconstruct what the page actually
//! talked to; entries live and die with the document.

use dashmap::DashMap;
use std::sync::{Mutex, PoisonError};

use crate::request::descriptor::{ContentKind, ContextId};

/// One sub-resource load observed through a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectedLoad {
    pub site: String,
    pub kind: ContentKind,
}

/// Maps `(context, top document URI)` to the redirected loads seen for
/// that document.
#[derive(Debug, Default)]
pub struct RedirectCache {
    entries: DashMap<(u64, String), Vec<RedirectedLoad>>,
}

impl RedirectCache {
    pub fn new() -> Self {
        RedirectCache::default()
    }

    pub fn push(&self, context: ContextId, document_uri: &str, load: RedirectedLoad) {
        self.entries
            .entry((context.0, document_uri.to_owned()))
            .or_default()
            .push(load);
    }

    pub fn for_document(&self, context: ContextId, document_uri: &str) -> Vec<RedirectedLoad> {
        self.entries
            .get(&(context.0, document_uri.to_owned()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Drops the records of one document, typically when it unloads.
    pub fn clear_document(&self, context: ContextId, document_uri: &str) {
        self.entries.remove(&(context.0, document_uri.to_owned()));
    }

    /// Drops every record of a browsing context, when the tab closes.
    pub fn clear_context(&self, context: ContextId) {
        self.entries.retain(|(ctx, _), _| *ctx != context.0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Upper bound on the recently-blocked log before it truncates.
pub const RECENT_BLOCKS_MAX: usize = 40;

/// Most-recently-blocked sites, newest last.
///
/// Re-blocking a site moves it to the tail instead of duplicating it;
/// when the log overflows, only the newest half is kept.
#[derive(Debug, Default)]
pub struct RecentBlocks {
    entries: Mutex<Vec<String>>,
}

impl RecentBlocks {
    pub fn new() -> Self {
        RecentBlocks::default()
    }

    pub fn record(&self, site: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = entries.iter().rposition(|s| s == site) {
            if pos == entries.len() - 1 {
                return;
            }
            entries.remove(pos);
        }
        entries.push(site.to_owned());
        if entries.len() > RECENT_BLOCKS_MAX {
            let keep_from = entries.len() - RECENT_BLOCKS_MAX / 2;
            entries.drain(..keep_from);
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
