//! Request identity and metadata supplied by the embedding network layer.
//!
//! The policy core never probes host objects: everything it needs to know
//! about a channel arrives here as plain data (capability bits instead of
//! interface checks, numeric kinds instead of duck typing).

use bitflags::bitflags;
use url::Url;

use crate::sites::site_of;

/// Opaque identity of one in-flight request, unique per redirect hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Identity of the browsing context (tab) a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Content classification of a load.
///
/// Modeled after Gecko's `nsIContentPolicy` type constants; the raw values
/// are the ones content-policy callbacks deliver, so adapters can pass
/// them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Other,
    Script,
    Image,
    Stylesheet,
    Object,
    Document,
    Subdocument,
    Xhr,
    ObjectSubrequest,
    Font,
    Media,
}

impl ContentKind {
    pub fn as_u32(&self) -> u32 {
        match self {
            ContentKind::Other => 1,
            ContentKind::Script => 2,
            ContentKind::Image => 3,
            ContentKind::Stylesheet => 4,
            ContentKind::Object => 5,
            ContentKind::Document => 6,
            ContentKind::Subdocument => 7,
            ContentKind::Xhr => 11,
            ContentKind::ObjectSubrequest => 12,
            ContentKind::Font => 14,
            ContentKind::Media => 15,
        }
    }

    /// Unknown raw values classify as [`ContentKind::Other`], which is
    /// never gated, so an adapter speaking a newer numbering cannot make
    /// the core block something it does not understand.
    pub fn from_u32(raw: u32) -> Self {
        match raw {
            2 => ContentKind::Script,
            3 => ContentKind::Image,
            4 => ContentKind::Stylesheet,
            5 => ContentKind::Object,
            6 => ContentKind::Document,
            7 => ContentKind::Subdocument,
            11 => ContentKind::Xhr,
            12 => ContentKind::ObjectSubrequest,
            14 => ContentKind::Font,
            15 => ContentKind::Media,
            _ => ContentKind::Other,
        }
    }

    /// True for top-level document loads.
    pub fn is_document(&self) -> bool {
        matches!(self, ContentKind::Document)
    }

    /// True for frame and iframe loads.
    pub fn is_frame(&self) -> bool {
        matches!(self, ContentKind::Subdocument)
    }

    /// Kinds that render through a plugin or media pipeline and can be
    /// granted individually via the object whitelist.
    pub fn is_embedding(&self) -> bool {
        matches!(
            self,
            ContentKind::Object
                | ContentKind::ObjectSubrequest
                | ContentKind::Font
                | ContentKind::Media
        )
    }
}

bitflags! {
    /// Capabilities of the underlying channel, declared by the adapter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestCaps: u8 {
        /// The channel speaks HTTP and carries policy state across hops.
        const HTTP = 1;
        /// The channel can receive `Set-Cookie` rewrites.
        const SECURE_COOKIE_CAPABLE = 1 << 1;
        /// The channel may be served from a cache.
        const CACHEABLE = 1 << 2;
    }
}

bitflags! {
    /// Load-flag bits relevant to policy decisions.
    ///
    /// Raw values match Gecko's `nsIRequest`/`nsIChannel` flag words so
    /// adapters can forward the native word unmodified.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LoadFlags: u32 {
        const BYPASS_CACHE = 1 << 9;
        const VALIDATE_ALWAYS = 1 << 11;
        const DOCUMENT_URI = 1 << 16;
        const BYPASS_LOCAL_CACHE = 1 << 28;
    }
}

impl LoadFlags {
    /// True when the load refuses cached answers, which also makes any
    /// cached DNS mapping for it suspect.
    pub fn cache_busting(&self) -> bool {
        self.intersects(
            LoadFlags::VALIDATE_ALWAYS | LoadFlags::BYPASS_CACHE | LoadFlags::BYPASS_LOCAL_CACHE,
        )
    }
}

/// Everything the lifecycle coordinator consumes about one request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub id: RequestId,
    pub url: Url,
    pub kind: ContentKind,
    pub caps: RequestCaps,
    pub load_flags: LoadFlags,
    /// Browsing context the request loads into, when known.
    pub context: Option<ContextId>,
    /// The document (or resource) that caused this load.
    pub origin: Option<Url>,
    pub mime: Option<String>,
    /// URI of the top document of the owning context, for the redirect
    /// cache.
    pub document_url: Option<Url>,
    /// True when the target window is a subframe rather than the top one.
    pub subframe: bool,
}

impl RequestDescriptor {
    pub fn new(id: RequestId, url: Url, kind: ContentKind) -> Self {
        RequestDescriptor {
            id,
            url,
            kind,
            caps: RequestCaps::HTTP,
            load_flags: LoadFlags::empty(),
            context: None,
            origin: None,
            mime: None,
            document_url: None,
            subframe: false,
        }
    }

    /// Canonical site key of the target.
    pub fn site(&self) -> String {
        site_of(&self.url)
    }

    pub fn is_document_load(&self) -> bool {
        self.load_flags.contains(LoadFlags::DOCUMENT_URI)
    }
}

/// A content-policy question: may `url` of `kind` load for `origin`?
///
/// This is the view [`Engine::should_allow`] decides on, both at check
/// time and again on every redirect hop.
///
/// [`Engine::should_allow`]: crate::engine::Engine::should_allow
#[derive(Debug, Clone)]
pub struct ContentRequest {
    pub kind: ContentKind,
    pub url: Url,
    pub origin: Option<Url>,
    pub context: Option<ContextId>,
    pub mime: Option<String>,
}

impl ContentRequest {
    pub fn new(kind: ContentKind, url: Url) -> Self {
        ContentRequest {
            kind,
            url,
            origin: None,
            context: None,
            mime: None,
        }
    }

    pub fn site(&self) -> String {
        site_of(&self.url)
    }

    pub fn origin_site(&self) -> Option<String> {
        self.origin.as_ref().map(site_of)
    }
}

impl From<&RequestDescriptor> for ContentRequest {
    fn from(desc: &RequestDescriptor) -> Self {
        ContentRequest {
            kind: desc.kind,
            url: desc.url.clone(),
            origin: desc.origin.clone(),
            context: desc.context,
            mime: desc.mime.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_numbering_roundtrip() {
        for kind in [
            ContentKind::Other,
            ContentKind::Script,
            ContentKind::Image,
            ContentKind::Stylesheet,
            ContentKind::Object,
            ContentKind::Document,
            ContentKind::Subdocument,
            ContentKind::Xhr,
            ContentKind::ObjectSubrequest,
            ContentKind::Font,
            ContentKind::Media,
        ] {
            assert_eq!(ContentKind::from_u32(kind.as_u32()), kind);
        }
        assert_eq!(ContentKind::Script.as_u32(), 2);
        assert_eq!(ContentKind::Subdocument.as_u32(), 7);
        assert_eq!(ContentKind::Media.as_u32(), 15);
    }

    #[test]
    fn test_unknown_kind_is_other() {
        assert_eq!(ContentKind::from_u32(9), ContentKind::Other);
        assert_eq!(ContentKind::from_u32(999), ContentKind::Other);
    }

    #[test]
    fn test_cache_busting_flags() {
        assert!(!LoadFlags::DOCUMENT_URI.cache_busting());
        assert!(LoadFlags::VALIDATE_ALWAYS.cache_busting());
        assert!(LoadFlags::BYPASS_CACHE.cache_busting());
        assert!((LoadFlags::DOCUMENT_URI | LoadFlags::BYPASS_LOCAL_CACHE).cache_busting());
    }

    #[test]
    fn test_descriptor_site() {
        let url = Url::parse("https://example.com:8443/a/b").unwrap();
        let desc = RequestDescriptor::new(RequestId(1), url, ContentKind::Script);
        assert_eq!(desc.site(), "https://example.com:8443");
        assert!(!desc.is_document_load());
    }
}
