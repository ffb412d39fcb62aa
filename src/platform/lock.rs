use std::fmt;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// The operation the playback session calls to hand the device back locked.
pub trait LockAction: Send + Sync {
    fn lock_now(&self) -> LockReport;

    /// Whether the device is locked already, in which case there is nothing to show.
    fn is_locked(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct LockPlan {
    pub lock_command: Option<String>,
    pub locked_probe: Option<String>,
}

#[derive(Clone)]
pub struct LockController {
    plan: LockPlan,
    enrolled: bool,
    runner: CommandRunner,
}

impl fmt::Debug for LockController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockController")
            .field("plan", &self.plan)
            .field("enrolled", &self.enrolled)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Enrollment never completed (or no command configured); nothing ran.
    NotEnrolled,
    Locked,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LockReport {
    pub outcome: LockOutcome,
    pub command: Option<CommandExecution>,
}

impl LockReport {
    pub fn not_enrolled() -> Self {
        Self {
            outcome: LockOutcome::NotEnrolled,
            command: None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == LockOutcome::Locked
    }
}

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl LockController {
    pub fn new(plan: LockPlan, enrolled: bool) -> Self {
        Self::build(plan, enrolled, default_runner())
    }

    fn build(plan: LockPlan, enrolled: bool, runner: CommandRunner) -> Self {
        Self {
            plan,
            enrolled,
            runner,
        }
    }

    #[cfg(test)]
    fn with_runner(plan: LockPlan, enrolled: bool, runner: CommandRunner) -> Self {
        Self::build(plan, enrolled, runner)
    }

    pub fn is_enrolled(&self) -> bool {
        self.enrolled && self.plan.lock_command.is_some()
    }

    fn run_shell(&self, command: &str) -> CommandExecution {
        match (self.runner)(command) {
            Ok(output) => CommandExecution {
                command: command.to_string(),
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(err) => CommandExecution {
                command: command.to_string(),
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: err.to_string(),
            },
        }
    }
}

impl LockAction for LockController {
    fn lock_now(&self) -> LockReport {
        let command = match self.plan.lock_command.as_deref() {
            Some(command) if self.enrolled => command,
            _ => {
                debug!(
                    enrolled = self.enrolled,
                    configured = self.plan.lock_command.is_some(),
                    "lock enforcement inactive; skipping lock"
                );
                return LockReport::not_enrolled();
            }
        };

        let execution = self.run_shell(command);
        let outcome = if execution.success {
            info!(command, "device locked");
            LockOutcome::Locked
        } else {
            let exit = execution
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(
                exit_code = exit,
                stderr = execution.stderr,
                command,
                "lock command failed"
            );
            LockOutcome::Failed
        };
        LockReport {
            outcome,
            command: Some(execution),
        }
    }

    // No probe, or a probe that cannot run, reads as unlocked.
    fn is_locked(&self) -> bool {
        let Some(probe) = self.plan.locked_probe.as_deref() else {
            return false;
        };
        let execution = self.run_shell(probe);
        debug!(
            command = probe,
            exit_code = execution.exit_code,
            stderr = execution.stderr,
            "locked probe finished"
        );
        execution.success
    }
}

fn default_runner() -> CommandRunner {
    Arc::new(|command| run_shell(command))
}

fn run_shell(command: &str) -> Result<CommandOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
