//! Trust state and the per-site enablement decision.

pub mod granularity;
pub mod registry;
pub mod transport;

pub use granularity::UntrustedGranularity;
pub use registry::{DocshellJsMode, TrustRegistry};
pub use transport::{DirectProbe, HttpsOnlyLevel, ProxyProbe, TransportPolicy};
