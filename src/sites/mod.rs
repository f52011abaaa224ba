//! Site identity, address patterns and trust-list sets.
//!
//! A "site" is the `scheme://host[:port]` prefix a policy decision is
//! keyed on. This area owns canonicalization from full URLs, the typed
//! address-pattern matcher used for exception lists, and [`PolicySet`],
//! the cascade-aware collection backing every trust list.
//!
//! NoScript mapping: `Main.js` `getSite`/`getQuickSite`, the
//! `PolicySites`/`URIPatternList` machinery and `splitList`.

pub mod matcher;
pub mod policyset;
pub mod site;

pub use matcher::{AddressMatcher, AddressPattern};
pub use policyset::PolicySet;
pub use site::{site_from_str, site_of, split_list, WildcardDepth};
