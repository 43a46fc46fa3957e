//! Program loaders.

use std::path::Path;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use tracing::{debug, info};

use patchtrap_monitor::{ProgramFailure, ProgramLoader};
use patchtrap_registry::{Environment, Namespace};

use crate::script::GuardScript;

/// Runs guard scripts in-process against the monitored namespace.
pub struct ScriptLoader {
    namespace: Namespace,
    environment: Arc<dyn Environment>,
}

impl ScriptLoader {
    /// Creates a loader bound to the namespace and environment under watch.
    pub fn new(namespace: Namespace, environment: Arc<dyn Environment>) -> Self {
        Self {
            namespace,
            environment,
        }
    }
}

impl ProgramLoader for ScriptLoader {
    fn run(&self, program: &Path, args: &[String]) -> Result<(), ProgramFailure> {
        let script = GuardScript::from_file(program, args)
            .map_err(|e| ProgramFailure::new(e.to_string()))?;
        info!(
            program = %program.display(),
            commands = script.len(),
            "Running guard script"
        );
        script.execute(&self.namespace, self.environment.as_ref())
    }
}

/// Runs the program as a child process.
///
/// The child inherits this process's environment and standard streams. Only
/// its exit status is observed; its own memory is outside the namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLoader;

impl ProgramLoader for ProcessLoader {
    fn run(&self, program: &Path, args: &[String]) -> Result<(), ProgramFailure> {
        info!(program = %program.display(), args = ?args, "Spawning guarded process");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| ProgramFailure::new(format!("cannot start {}: {}", program.display(), e)))?;
        debug!(%status, "Guarded process exited");
        status_to_outcome(status)
    }
}

fn status_to_outcome(status: ExitStatus) -> Result<(), ProgramFailure> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(ProgramFailure::exit(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(ProgramFailure::new(format!(
                "program terminated by signal {}",
                signal
            )));
        }
    }
    Err(ProgramFailure::new(format!("program ended abnormally: {}", status)))
}
