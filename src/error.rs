use thiserror::Error;

/// Top-level error type for configuration processing.
///
/// Resolution not-found errors ([`Error::NotFound`]) are the only kind the
/// engine recovers from locally, and only for optional locations or when
/// `spring.config.on-not-found=ignore` is set. Every other kind aborts the
/// whole `process_and_apply` call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A mandatory location or an already-resolved resource is absent.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// I/O failure while reading a resource that exists.
    #[error("failed to load config data from '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A loader could not parse the resource content.
    #[error("failed to parse config data from '{name}': {message}")]
    Parse { name: String, message: String },

    /// A property key is not allowed where it was declared, or carries an
    /// unusable value.
    #[error("invalid config data property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    /// A bind touched a property owned by a contributor that fails its
    /// activation predicate.
    #[error("property '{key}' was found in property source '{source_name}' which is not active")]
    InactiveAccess { key: String, source_name: String },

    /// The legacy-processing opt-in flag is set; the caller must switch
    /// pipelines instead of using this engine.
    #[error("legacy config processing was requested via '{0}'")]
    UseLegacyProcessing(String),

    /// A location string cannot be used as written.
    #[error("invalid config data location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    /// `spring.config.name` entries may not contain wildcards.
    #[error("config name '{0}' cannot contain '*'")]
    InvalidConfigName(String),

    /// An `on-profile` value failed to parse as a profile expression.
    #[error("invalid profile expression '{expression}': {reason}")]
    InvalidProfileExpression { expression: String, reason: String },

    /// A `${...}` reference points at a key no property source provides.
    #[error("placeholder '${{{0}}}' could not be resolved")]
    PlaceholderNotFound(String),

    /// Placeholder resolution exceeded the nesting limit.
    #[error("circular placeholder reference while resolving '{0}'")]
    CircularPlaceholder(String),

    /// A placeholder reference is missing its closing '}'.
    #[error("unclosed placeholder reference in '{0}'")]
    UnclosedPlaceholder(String),
}

/// Absent config data, at one of two granularities.
///
/// A [`NotFoundError::Location`] means a whole location produced nothing; a
/// [`NotFoundError::Resource`] means a specific resolved candidate (for
/// example one previously listed by a glob) is missing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotFoundError {
    #[error("config data location '{location}' {reason}")]
    Location { location: String, reason: String },

    #[error("config data resource '{resource}' via location '{location}' does not exist")]
    Resource { resource: String, location: String },
}

impl NotFoundError {
    pub(crate) fn location_missing(location: impl Into<String>) -> Self {
        NotFoundError::Location {
            location: location.into(),
            reason: "does not exist".to_string(),
        }
    }
}
