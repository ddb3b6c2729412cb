//! Error and completion types for the mixer.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by the mixer and through source completions.
///
/// I/O errors are wrapped in `Arc` so one egress failure can be delivered
/// to every source that was playing when it happened.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The mixer was closed and accepts no more sources.
    #[error("mixer closed")]
    Closed,

    /// Reading from a source's ingress stream failed.
    #[error("ingress read failed: {0}")]
    Ingress(Arc<io::Error>),

    /// Writing mixed audio to the egress sink failed; mixing stopped.
    #[error("egress write failed: {0}")]
    Egress(Arc<io::Error>),

    /// A background thread could not be started.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: Arc<io::Error>,
    },

    /// The mixer thread panicked.
    #[error("mixer thread panicked")]
    Panicked,

    /// The source went away without resolving its completion.
    #[error("source abandoned before completion")]
    Abandoned,
}

/// Convenience alias for mixer results.
pub type Result<T> = std::result::Result<T, Error>;

/// How a source finished when it finished without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The ingress stream reached end-of-stream.
    Finished,
    /// The source was canceled; unmixed bytes were discarded.
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Closed.to_string(), "mixer closed");

        let err = Error::Ingress(Arc::new(io::Error::other("pipe broke")));
        assert_eq!(err.to_string(), "ingress read failed: pipe broke");

        let err = Error::Spawn {
            what: "mixer",
            source: Arc::new(io::Error::other("no threads")),
        };
        assert!(err.to_string().contains("mixer thread"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
