//! Cascade behavior for blacklist delisting on whitelist actions.

use bitflags::bitflags;

bitflags! {
    /// Controls how allowing a site affects blacklisted descendants.
    ///
    /// When a site is granted trust, entries below it on the untrusted
    /// blacklist either survive or get delisted along with it. The two
    /// `KEEP_*` bits preserve descendants for permanent and temporary
    /// grants respectively; `DELIST_UNTRUSTED_TARGET` forces delisting
    /// when the granted site is itself a single blacklisted entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UntrustedGranularity: u8 {
        const KEEP_BLACKLISTED_ON_TEMPORARY = 1;
        const KEEP_BLACKLISTED_ON_PERMANENT = 2;
        const DELIST_UNTRUSTED_TARGET = 4;
    }
}

impl Default for UntrustedGranularity {
    fn default() -> Self {
        Self::KEEP_BLACKLISTED_ON_TEMPORARY | Self::KEEP_BLACKLISTED_ON_PERMANENT
    }
}

impl UntrustedGranularity {
    pub fn from_mask(mask: u8) -> Self {
        Self::from_bits_truncate(mask)
    }

    pub fn mask(&self) -> u8 {
        self.bits()
    }

    /// Whether an allow action must cascade through the blacklist,
    /// delisting descendants of the granted site.
    ///
    /// `single_untrusted_target` is true when the grant targets one
    /// site that is currently blacklisted itself.
    pub fn cascades(&self, temporary: bool, single_untrusted_target: bool) -> bool {
        let keep = if temporary {
            self.contains(Self::KEEP_BLACKLISTED_ON_TEMPORARY)
        } else {
            self.contains(Self::KEEP_BLACKLISTED_ON_PERMANENT)
        };
        !keep || (self.contains(Self::DELIST_UNTRUSTED_TARGET) && single_untrusted_target)
    }
}
