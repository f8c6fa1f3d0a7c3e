use thiserror::Error;

/// Failure reported by a document provider while opening or rasterizing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("document could not be read: {0}")]
    Unreadable(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("page {index} out of range (document has {page_count} pages)")]
    PageOutOfRange { index: usize, page_count: usize },
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("render task panicked: {0}")]
    Panicked(String),
}

/// Outcome of a render that produced no page.
///
/// Cancellation is kept apart from provider failures: a cancelled render is never
/// surfaced to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderFailure {
    #[error("render cancelled")]
    Cancelled,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
