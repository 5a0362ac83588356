use std::sync::Arc;

use crate::ufc::VariationType;

/// Represents a result type for operations in this crate.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while refreshing configuration or assigning
/// a subject.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The requested flag is not present in the configuration store. It either has never been
    /// fetched or has been evicted.
    #[error("flag configuration not found")]
    ConfigNotFound,

    /// The flag was present in the configuration payload but failed to parse (server sent a
    /// format this version does not understand).
    #[error("error parsing flag configuration, try upgrading the SDK")]
    ConfigurationParseError,

    /// The stored variation value does not match the flag's declared variation type.
    #[error("unable to convert variation value of flag {flag_key:?} to {variation_type:?}")]
    TypeConversionFailure {
        /// Key of the flag being evaluated.
        flag_key: String,
        /// Declared variation type of the flag.
        variation_type: VariationType,
    },

    /// A typed assignment was requested for a flag of a different type.
    #[error("invalid flag type (expected: {expected:?}, found: {found:?})")]
    InvalidType {
        /// Type requested by the caller.
        expected: VariationType,
        /// Declared type of the flag.
        found: VariationType,
    },

    /// A split references a variation key that does not exist in the flag.
    #[error("flag {flag_key:?} references unknown variation {variation_key:?}")]
    VariationNotFound {
        /// Key of the flag being evaluated.
        flag_key: String,
        /// Variation key referenced by the split.
        variation_key: String,
    },

    /// A condition uses an operator this engine does not recognize. Indicates corrupted
    /// control-plane data; evaluation of the current request is aborted.
    #[error("unrecognized condition operator {0:?}")]
    MalformedOperator(String),

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Network error while fetching configuration.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// The poller thread (or its refresh callback) panicked.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
