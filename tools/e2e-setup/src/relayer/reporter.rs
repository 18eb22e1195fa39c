/*!
   Recording of the commands that a relayer executes during a test.
*/

use core::time::Duration;
use itertools::Itertools;
use tracing::{debug, warn};

/**
   A single relayer command invocation.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerExecution {
    pub command: Vec<String>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl RelayerExecution {
    pub fn command_line(&self) -> String {
        self.command.iter().join(" ")
    }
}

/**
   Collects every command that relayers run on behalf of a test, so that
   failures can be inspected after the fact.
*/
#[derive(Debug, Default)]
pub struct RelayerExecReporter {
    executions: Vec<RelayerExecution>,
}

impl RelayerExecReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_relayer_exec(&mut self, execution: RelayerExecution) {
        if execution.success {
            debug!(
                "relayer command `{}` succeeded in {:?}",
                execution.command_line(),
                execution.elapsed
            );
        } else {
            warn!(
                "relayer command `{}` failed in {:?}: {}",
                execution.command_line(),
                execution.elapsed,
                execution.stderr
            );
        }

        self.executions.push(execution);
    }

    pub fn executions(&self) -> &[RelayerExecution] {
        &self.executions
    }

    pub fn failures(&self) -> impl Iterator<Item = &RelayerExecution> {
        self.executions.iter().filter(|execution| !execution.success)
    }
}
