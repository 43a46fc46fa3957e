//! The program-loader seam.
//!
//! A loader runs the guarded program to completion on the calling thread.
//! The supervisor invokes it on the blocking pool so periodic checks keep
//! running alongside.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Why the guarded program did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ProgramFailure {
    /// Exit code requested by the program, if it requested one.
    pub exit_code: Option<i32>,
    /// Description of the failure.
    pub message: String,
}

impl ProgramFailure {
    /// A failure without an exit code (error, panic, signal).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            message: message.into(),
        }
    }

    /// The program asked to exit with a non-zero status.
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            message: format!("program exited with status {}", code),
        }
    }
}

/// Runs a guarded program.
pub trait ProgramLoader: Send + Sync {
    /// Runs `program` with `args` and blocks until it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramFailure`] when the program fails or exits non-zero.
    fn run(&self, program: &Path, args: &[String]) -> Result<(), ProgramFailure>;
}

impl<F> ProgramLoader for F
where
    F: Fn(&Path, &[String]) -> Result<(), ProgramFailure> + Send + Sync,
{
    fn run(&self, program: &Path, args: &[String]) -> Result<(), ProgramFailure> {
        self(program, args)
    }
}
