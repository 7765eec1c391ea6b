use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the gallery, resolver and history store.
///
/// Everything except `Io` is recoverable at the command layer and ends up as
/// a warning in the output payload unless `--strict` is set.
#[derive(Debug, Error)]
pub enum FaciesError {
    #[error("no image available in the {namespace} gallery")]
    EmptyLibrary { namespace: &'static str },

    #[error("{mode} mode needs an uploaded well image (--upload)")]
    MissingUpload { mode: &'static str },

    #[error("upload not readable: {}", path.display())]
    UnreadableUpload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{name} = {value} is outside [{min}, {max}] or off the {step} step")]
    InvalidCondition {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
        step: f64,
    },

    #[error("failed to write history entry {}", path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cleared {removed} history entries, {} could not be removed", failed.len())]
    PartialClear { removed: usize, failed: Vec<String> },

    #[error("history entry not found: {0}")]
    EntryNotFound(String),

    #[error("{context}: {}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FaciesError {
    /// Display text followed by each source, joined with `: `.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        FaciesError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

pub type FaciesResult<T> = std::result::Result<T, FaciesError>;
