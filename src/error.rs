//! Error taxonomy for the dispatch engine.
//!
//! Every failure that reaches an operator is one of the [`DispatchError`]
//! variants and is rendered into a reply by [`DispatchError::to_reply`], so
//! no command is ever left without a response.

use std::path::PathBuf;

use thiserror::Error;

use crate::sources::Reply;

/// Failures surfaced to the operator.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed arguments, unknown action type, malformed http template,
    /// unknown extension or task id. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Non-zero subprocess exit, non-2xx response or a transport failure.
    #[error("{what} failed: {detail}")]
    Execution { what: String, detail: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn execution(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Execution {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Render the error as the reply the operator sees.
    pub fn to_reply(&self) -> Reply {
        match self {
            Self::Validation(msg) => Reply::fail(msg.clone()),
            Self::Execution { what, detail } => {
                let detail = detail.trim_end();
                if detail.contains('\n') {
                    Reply::fail(format!("{what} failed:\nError:\n```\n{detail}\n```"))
                } else {
                    Reply::fail(format!("{what} failed: {detail}"))
                }
            }
            Self::Persistence(e) => Reply::fail(e.to_string()),
            Self::Template(e) => Reply::fail(e.to_string()),
        }
    }
}

/// Failures reading or writing a durable document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Placeholder substitution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Missing placeholder for '{0}'")]
    Missing(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_error_names_missing_key() {
        let err = DispatchError::from(TemplateError::Missing("degrees".into()));
        let reply = err.to_reply();
        assert!(reply.render().starts_with(crate::sources::GLYPH_FAIL));
        assert!(reply.render().contains("degrees"));
    }

    #[test]
    fn multiline_execution_detail_is_fenced() {
        let err = DispatchError::execution("backup", "line one\nline two\n");
        let text = err.to_reply().render();
        assert!(text.contains("```\nline one\nline two\n```"));
    }
}
