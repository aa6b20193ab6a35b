//! Domain error types.

use crate::domain::ast::ValueType;

/// Failure raised by the indicator library for a bad request.
///
/// Missing trade, funding or exchange data never produces one of these; it
/// yields the NaN sentinel instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LibraryError {
    #[error("invalid parameter for {indicator}: {reason}")]
    InvalidParameter { indicator: String, reason: String },
}

/// Fatal evaluation failure. Insufficient history is not an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
        context: String,
    },

    #[error("unknown property {property} for {indicator}")]
    UnknownProperty { indicator: String, property: String },

    #[error("{indicator} has several outputs; a property is required")]
    MissingProperty { indicator: String },

    #[error("invalid argument to {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Failure of a page computation or of the page manager itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PageError {
    #[error("page computation failed: {message}")]
    Computation { message: String },

    #[error("series unavailable: {reason}")]
    Series { reason: String },

    #[error("page manager requires a tokio runtime")]
    NoRuntime,
}

impl From<LibraryError> for PageError {
    fn from(err: LibraryError) -> Self {
        PageError::Computation {
            message: err.to_string(),
        }
    }
}

/// Top-level error type for signalforge.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
