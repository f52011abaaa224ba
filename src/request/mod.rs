//! Per-request policy state and the network lifecycle callbacks.
//!
//! NoScript mapping:
//!
//! | NoScript (JS)               | trustnet (Rust)                         | Responsibility                        |
//! |-----------------------------|-----------------------------------------|---------------------------------------|
//! | `PolicyState` (IOUtil)      | [`state::PolicyStateTable`]             | carry decisions from check to channel |
//! | `onChannelRedirect`         | [`coordinator::RequestLifecycleCoordinator::on_redirect`] | redirect re-validation |
//! | `onStateChange`             | `on_start` / `on_stop`                  | attach, late frame checks, DNS repair |
//! | `onStatusChange`            | `on_dns_resolving`                      | rule re-check after DNS refresh       |
//! | `getRedirCache`             | [`redircache::RedirectCache`]           | per-document redirected loads         |
//! | `recordBlocked`             | [`redircache::RecentBlocks`]            | recently blocked sites for the UI     |

pub mod coordinator;
pub mod descriptor;
pub mod redircache;
pub mod state;

pub use coordinator::RequestLifecycleCoordinator;
pub use descriptor::{
    ContentKind, ContentRequest, ContextId, LoadFlags, RequestCaps, RequestDescriptor, RequestId,
};
pub use redircache::{RecentBlocks, RedirectCache, RedirectedLoad, RECENT_BLOCKS_MAX};
pub use state::{AttachOutcome, CheckPhase, PolicyState, PolicyStateTable, StateExtra};
