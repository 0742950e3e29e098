use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::logic::LogicError;
use crate::phase::Phase;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid phase {0}")]
    InvalidPhase(u8),

    #[error("no {phase} phase for {task}")]
    MissingCapability { phase: Phase, task: String },

    #[error("missing phase")]
    MissingPhase,

    #[error("unknown phase {0}")]
    UnknownPhase(String),

    #[error("no task {0}")]
    NoSuchTask(usize),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode pair: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode pair: {0}")]
    Decode(#[source] bincode::Error),

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("{phase} logic failed in {task}: {source}")]
    Logic {
        phase: Phase,
        task: String,
        #[source]
        source: LogicError,
    },

    /// Returned to job logic once its collector has already failed. The
    /// first failure is what the owning task reports.
    #[error("collector failed on an earlier write")]
    CollectorFailed,

    #[error("group producer exited unexpectedly")]
    ProducerLost,

    #[error(transparent)]
    Args(#[from] clap::Error),
}

impl Error {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Open {
            path: path.into(),
            source,
        }
    }
}
