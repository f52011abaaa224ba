use thiserror::Error;

use crate::request::descriptor::ContentKind;

/// A single pattern line that failed to parse.
///
/// Parse failures are reported, never fatal: the enclosing matcher keeps
/// the lines that did parse, and a fully unparsable list compiles to a
/// matcher that matches nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("bad pattern {line:?} at index {index}: {reason}")]
pub struct PatternError {
    pub index: usize,
    pub line: String,
    pub reason: PatternErrorKind,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PatternErrorKind {
    #[error("empty pattern")]
    Empty,
    #[error("unsupported scheme")]
    BadScheme,
    #[error("invalid host")]
    BadHost,
    #[error("invalid port")]
    BadPort,
    #[error("wildcard not allowed here")]
    BadWildcard,
}

/// Errors surfaced at the enforcement edges. Every variant resolves to a
/// deny or to unmodified pass-through; no error path grants trust.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A redirect hop was re-validated and denied. The message carries
    /// the full causality chain for the abort log.
    #[error("redirect vetoed: {from} -> {to} ({kind:?})")]
    RedirectVetoed {
        from: String,
        to: String,
        kind: ContentKind,
    },

    /// A still-pending content check was found for a URI that is being
    /// requested again, the signature of a recursive-load denial of
    /// service. The stale check is dropped and the request aborted.
    #[error("content check still pending for {uri}, aborting")]
    StuckCheck { uri: String },

    /// A late (post-decision) check denied the load.
    #[error("content blocked: {site} ({kind:?})")]
    ContentBlocked { site: String, kind: ContentKind },
}

impl PolicyError {
    /// True when the embedder should cancel the underlying channel.
    pub fn is_abort(&self) -> bool {
        !matches!(self, PolicyError::Pattern(_))
    }
}
