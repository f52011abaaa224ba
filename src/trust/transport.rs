//! Plaintext-transport restrictions on active content.
//!
//! NoScript mapping: `HTTPS.shouldForbid` and the `allowHttpsOnly`
//! preference ladder.

use std::fmt;

use serde::{Deserialize, Serialize};

/// When plaintext (`http:`/`ftp:`) sites are denied active content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpsOnlyLevel {
    /// Plaintext transport never blocks by itself.
    #[default]
    Never,
    /// Block plaintext only when the connection goes through a proxy.
    WhenProxied,
    /// Block all plaintext transport.
    Always,
}

impl From<u8> for HttpsOnlyLevel {
    fn from(raw: u8) -> Self {
        match raw {
            1 => HttpsOnlyLevel::WhenProxied,
            2 => HttpsOnlyLevel::Always,
            _ => HttpsOnlyLevel::Never,
        }
    }
}

impl HttpsOnlyLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            HttpsOnlyLevel::Never => 0,
            HttpsOnlyLevel::WhenProxied => 1,
            HttpsOnlyLevel::Always => 2,
        }
    }
}

/// Answers whether a given site would be fetched through a proxy.
///
/// The embedder supplies this; proxy discovery itself lives outside
/// the policy core.
pub trait ProxyProbe {
    fn is_proxied(&self, site: &str) -> bool;
}

/// Probe for direct connections: nothing is proxied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectProbe;

impl ProxyProbe for DirectProbe {
    fn is_proxied(&self, _site: &str) -> bool {
        false
    }
}

/// Transport-level veto applied after list checks.
pub struct TransportPolicy {
    level: HttpsOnlyLevel,
    probe: Box<dyn ProxyProbe + Send + Sync>,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self::new(HttpsOnlyLevel::Never)
    }
}

impl fmt::Debug for TransportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportPolicy")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl TransportPolicy {
    pub fn new(level: HttpsOnlyLevel) -> Self {
        Self {
            level,
            probe: Box::new(DirectProbe),
        }
    }

    pub fn with_probe(level: HttpsOnlyLevel, probe: Box<dyn ProxyProbe + Send + Sync>) -> Self {
        Self { level, probe }
    }

    pub fn level(&self) -> HttpsOnlyLevel {
        self.level
    }

    pub fn set_level(&mut self, level: HttpsOnlyLevel) {
        self.level = level;
    }

    pub fn set_probe(&mut self, probe: Box<dyn ProxyProbe + Send + Sync>) {
        self.probe = probe;
    }

    /// Whether the site's transport alone forbids active content.
    pub fn forbids(&self, site: &str) -> bool {
        match self.level {
            HttpsOnlyLevel::Never => false,
            HttpsOnlyLevel::WhenProxied => is_plaintext(site) && self.probe.is_proxied(site),
            HttpsOnlyLevel::Always => is_plaintext(site),
        }
    }
}

fn is_plaintext(site: &str) -> bool {
    site.starts_with("http://") || site.starts_with("ftp://")
}
