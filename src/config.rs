//! Engine preferences and their JSON persistence.
//!
//! NoScript mapping: the `noscript.*` pref branch consumed by
//! `Main.js` `syncPrefs`, flattened into one serializable struct.
//! [`ConfigDelta`] plays the role of a pref-observer batch: only the
//! fields it carries change, everything else keeps its current value.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sites::matcher::AddressMatcher;
use crate::sites::WildcardDepth;
use crate::trust::registry::DocshellJsMode;
use crate::trust::transport::HttpsOnlyLevel;

/// When a subframe target is blocked because of where it is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IframeContext {
    /// Every subframe, regardless of origin.
    AllIframes,
    /// Frames whose site differs from the parent's.
    DifferentSite,
    /// Frames whose host differs from the parent's.
    #[default]
    DifferentDomain,
    /// Frames whose registrable domain differs from the parent's.
    DifferentBaseDomain,
}

impl From<u8> for IframeContext {
    fn from(raw: u8) -> Self {
        match raw {
            0 => IframeContext::AllIframes,
            1 => IframeContext::DifferentSite,
            3 => IframeContext::DifferentBaseDomain,
            _ => IframeContext::DifferentDomain,
        }
    }
}

impl IframeContext {
    pub fn as_u8(&self) -> u8 {
        match self {
            IframeContext::AllIframes => 0,
            IframeContext::DifferentSite => 1,
            IframeContext::DifferentDomain => 2,
            IframeContext::DifferentBaseDomain => 3,
        }
    }
}

/// How scripted requests (XHR and kin) are restricted.
///
/// The levels nest: `SameSite` also demands what `TrustedTargets`
/// demands, so a same-site request toward an untrusted target still
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XhrPolicy {
    /// No restriction.
    AllowAll,
    /// The target site must be trusted.
    TrustedTargets,
    /// Same-site only, toward a trusted target.
    #[default]
    SameSite,
    /// Deny all scripted requests.
    ForbidAll,
}

impl From<u8> for XhrPolicy {
    fn from(raw: u8) -> Self {
        match raw {
            0 => XhrPolicy::AllowAll,
            1 => XhrPolicy::TrustedTargets,
            3 => XhrPolicy::ForbidAll,
            _ => XhrPolicy::SameSite,
        }
    }
}

impl XhrPolicy {
    pub fn as_u8(&self) -> u8 {
        match self {
            XhrPolicy::AllowAll => 0,
            XhrPolicy::TrustedTargets => 1,
            XhrPolicy::SameSite => 2,
            XhrPolicy::ForbidAll => 3,
        }
    }
}

/// Every tunable the engine reads, with the stock defaults.
///
/// List-shaped fields (`*_list`, `*_patterns`) hold space-separated
/// text exactly as persisted; they are compiled into sets and matchers
/// when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Trust lists
    /// Allow scripts globally; the blacklist still wins.
    pub global_allow: bool,
    /// Keep blocking embedded content from blacklisted sites even when
    /// their page is otherwise allowed.
    pub block_untrusted_content: bool,
    /// Grant a temporary permission to top-level sites as they load.
    pub auto_allow: bool,
    /// Revoking trust also blacklists the site.
    pub forbid_implies_untrust: bool,
    /// Site keys drop explicit ports.
    pub ignore_ports: bool,
    /// Blacklist-cascade mask, see
    /// [`UntrustedGranularity`](crate::trust::UntrustedGranularity).
    pub untrusted_granularity: u8,
    pub wildcard_depth: WildcardDepth,
    /// Sites that can never be distrusted.
    pub mandatory_list: String,
    /// Whitelist seed applied on first run.
    pub default_list: String,
    /// Address patterns trusted beyond the site lists.
    pub extra_allow_patterns: String,
    pub docshell_js: DocshellJsMode,
    pub https_only: HttpsOnlyLevel,

    // Embedding restrictions
    /// Block plugin content (applets, movies, generic objects).
    pub forbid_objects: bool,
    pub forbid_media: bool,
    pub forbid_fonts: bool,
    pub forbid_frames: bool,
    pub forbid_iframes: bool,
    pub iframe_context: IframeContext,
    pub xhr_policy: XhrPolicy,
    /// Apply the embedding restrictions on trusted pages too.
    pub content_blocker: bool,

    // Transport upgrade
    pub https_forced_patterns: String,
    pub https_forced_exception_patterns: String,

    // Cookie protection
    pub secure_cookies: bool,
    pub secure_cookies_per_tab: bool,
    pub secure_cookies_recycle: bool,
    pub secure_cookies_forced_patterns: String,
    pub secure_cookies_exception_patterns: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            global_allow: false,
            block_untrusted_content: true,
            auto_allow: false,
            forbid_implies_untrust: false,
            ignore_ports: true,
            untrusted_granularity: 3,
            wildcard_depth: WildcardDepth::One,
            mandatory_list: "chrome: about: resource:".to_string(),
            default_list: String::new(),
            extra_allow_patterns: String::new(),
            docshell_js: DocshellJsMode::BlockUntrusted,
            https_only: HttpsOnlyLevel::Never,
            forbid_objects: true,
            forbid_media: true,
            forbid_fonts: true,
            forbid_frames: false,
            forbid_iframes: false,
            iframe_context: IframeContext::DifferentDomain,
            xhr_policy: XhrPolicy::SameSite,
            content_blocker: false,
            https_forced_patterns: String::new(),
            https_forced_exception_patterns: String::new(),
            secure_cookies: false,
            secure_cookies_per_tab: false,
            secure_cookies_recycle: false,
            secure_cookies_forced_patterns: String::new(),
            secure_cookies_exception_patterns: String::new(),
        }
    }
}

impl EngineConfig {
    /// Compiles one of the pattern-list fields, keeping whatever parses.
    ///
    /// Broken lines are logged and skipped so one malformed pattern
    /// cannot turn a protection off wholesale.
    pub fn compile_patterns(&self, text: &str, what: &str) -> AddressMatcher {
        let (matcher, errors) = AddressMatcher::compile(text, self.wildcard_depth);
        for error in errors {
            warn!(list = what, line = %error.line, reason = ?error.reason, "dropping unparsable pattern");
        }
        matcher
    }
}

/// A batch of pref changes. `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDelta {
    pub global_allow: Option<bool>,
    pub block_untrusted_content: Option<bool>,
    pub auto_allow: Option<bool>,
    pub forbid_implies_untrust: Option<bool>,
    pub ignore_ports: Option<bool>,
    pub untrusted_granularity: Option<u8>,
    pub wildcard_depth: Option<WildcardDepth>,
    pub mandatory_list: Option<String>,
    pub default_list: Option<String>,
    pub extra_allow_patterns: Option<String>,
    pub docshell_js: Option<DocshellJsMode>,
    pub https_only: Option<HttpsOnlyLevel>,
    pub forbid_objects: Option<bool>,
    pub forbid_media: Option<bool>,
    pub forbid_fonts: Option<bool>,
    pub forbid_frames: Option<bool>,
    pub forbid_iframes: Option<bool>,
    pub iframe_context: Option<IframeContext>,
    pub xhr_policy: Option<XhrPolicy>,
    pub content_blocker: Option<bool>,
    pub https_forced_patterns: Option<String>,
    pub https_forced_exception_patterns: Option<String>,
    pub secure_cookies: Option<bool>,
    pub secure_cookies_per_tab: Option<bool>,
    pub secure_cookies_recycle: Option<bool>,
    pub secure_cookies_forced_patterns: Option<String>,
    pub secure_cookies_exception_patterns: Option<String>,
}

impl ConfigDelta {
    /// The config that results from applying this batch on `base`.
    pub fn merged(&self, base: &EngineConfig) -> EngineConfig {
        let mut next = base.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field.clone() {
                    next.$field = value;
                })*
            };
        }
        apply!(
            global_allow,
            block_untrusted_content,
            auto_allow,
            forbid_implies_untrust,
            ignore_ports,
            untrusted_granularity,
            wildcard_depth,
            mandatory_list,
            default_list,
            extra_allow_patterns,
            docshell_js,
            https_only,
            forbid_objects,
            forbid_media,
            forbid_fonts,
            forbid_frames,
            forbid_iframes,
            iframe_context,
            xhr_policy,
            content_blocker,
            https_forced_patterns,
            https_forced_exception_patterns,
            secure_cookies,
            secure_cookies_per_tab,
            secure_cookies_recycle,
            secure_cookies_forced_patterns,
            secure_cookies_exception_patterns,
        );
        next
    }
}

/// Save a config to a file as pretty-printed JSON.
pub fn save_config(config: &EngineConfig, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

/// Load a config from a file. Missing fields fall back to defaults, so
/// configs persisted by older builds keep loading.
pub fn load_config(path: &Path) -> io::Result<EngineConfig> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
