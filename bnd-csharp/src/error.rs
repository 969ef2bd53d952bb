//! The two fault classes of a generator run. Both abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    /// The input does not follow one of the recognized native conventions.
    #[error("unrecognized shape for `{subject}`: {detail}")]
    ShapeMismatch { subject: String, detail: String },

    /// The header parser or a symbol-model compilation reported diagnostics.
    #[error("{tool} reported {} diagnostic(s):\n  {}", diagnostics.len(), diagnostics.join("\n  "))]
    ToolDiagnostics {
        tool: &'static str,
        diagnostics: Vec<String>,
    },
}

impl GenError {
    pub fn shape(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        GenError::ShapeMismatch {
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

/// Bail out of the current function with a [`GenError::ShapeMismatch`].
macro_rules! shape_bail {
    ($subject:expr, $($arg:tt)*) => {
        return Err(anyhow::Error::new($crate::error::GenError::shape($subject, format!($($arg)*))))
    };
}

pub(crate) use shape_bail;
