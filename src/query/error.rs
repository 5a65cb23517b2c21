use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::extensions::ExtensionError;

/// Which stage rejected a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryErrorKind {
    /// The text does not parse; detected by the compiler
    SyntaxError,
    /// Evaluation against a particular tree failed
    EvaluationError,
    /// An extension function ran in a context it does not accept
    UnexpectedContext,
}

impl QueryErrorKind {
    /// Failure class shown to users in front of the message
    pub fn cause_name(self) -> &'static str {
        match self {
            QueryErrorKind::SyntaxError => "XPathSyntaxError",
            QueryErrorKind::EvaluationError => "XPathEvalError",
            QueryErrorKind::UnexpectedContext => "UnexpectedContext",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cause_name())
    }
}

/// The one error type for everything that can go wrong with a query.
///
/// Carries the query text so a host can redisplay it next to the
/// diagnostic. Plain data: safe to send back from worker threads.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{cause}: {message}")]
pub struct QueryError {
    pub source_text: String,
    pub kind: QueryErrorKind,
    pub message: String,
    /// Name of the originating failure class
    pub cause: String,
    /// Byte offset into `source_text` for syntax errors
    pub position: Option<usize>,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, source_text: &str, message: impl Into<String>) -> Self {
        Self {
            source_text: source_text.to_string(),
            kind,
            message: message.into(),
            cause: kind.cause_name().to_string(),
            position: None,
        }
    }

    pub fn syntax(source_text: &str, position: usize, message: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            ..Self::new(QueryErrorKind::SyntaxError, source_text, message)
        }
    }

    pub fn evaluation(source_text: &str, message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::EvaluationError, source_text, message)
    }

    pub fn from_extension(source_text: &str, error: ExtensionError) -> Self {
        match error {
            ExtensionError::UnexpectedContext { .. } => Self::new(
                QueryErrorKind::UnexpectedContext,
                source_text,
                error.to_string(),
            ),
            ExtensionError::Invalid(message) => Self::evaluation(source_text, message),
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == QueryErrorKind::SyntaxError
    }
}
