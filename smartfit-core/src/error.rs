use std::{error::Error as StdError, path::PathBuf};

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Unrecoverable failures of a try-on call.
#[derive(Error, Debug)]
pub enum TryOnError {
    #[error("failed to load {role} image {}", .path.display())]
    ImageLoad {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error(
        "dimension mismatch at {stage}: expected {}x{}, got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    DimensionMismatch {
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("failed to write composite to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl TryOnError {
    pub(crate) fn image_load(
        role: &'static str,
        path: impl Into<PathBuf>,
        err: anyhow::Error,
    ) -> Self {
        TryOnError::ImageLoad {
            role,
            path: path.into(),
            source: err.into(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        TryOnError::Write {
            path: path.into(),
            source: err.into(),
        }
    }

    /// Fail unless `actual` equals `expected`.
    pub(crate) fn check_dimensions(
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(TryOnError::DimensionMismatch {
                stage,
                expected,
                actual,
            })
        }
    }

    /// The error message followed by every underlying cause, joined with `": "`.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}
