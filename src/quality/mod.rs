//! Quality gates
//!
//! Post-execution checks (syntax, lint, type-check, test) run in order
//! after the execute stage. A failing gate is retried up to the configured
//! cap before the failure is surfaced.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::EventEmitter;

/// Outcome of one gate execution
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub gate: String,
    pub passed: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// A post-execution quality check
#[async_trait]
pub trait QualityGate: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, dir: &Path) -> eyre::Result<GateOutcome>;
}

/// Gate backed by a shell command; passes on exit code zero
pub struct CommandGate {
    name: String,
    command: String,
    timeout: Duration,
}

impl CommandGate {
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl QualityGate for CommandGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, dir: &Path) -> eyre::Result<GateOutcome> {
        debug!(gate = %self.name, command = %self.command, "running gate");
        let start = std::time::Instant::now();

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .current_dir(dir)
                .output(),
        )
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match output {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(GateOutcome {
                    gate: self.name.clone(),
                    passed: exit_code == 0,
                    exit_code,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    duration_ms,
                })
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(eyre::eyre!("gate {} timed out after {:?}", self.name, self.timeout)),
        }
    }
}

/// Runs the configured gates in order with per-gate retries
pub struct GateRunner {
    gates: Vec<Box<dyn QualityGate>>,
    max_retries: u32,
}

impl GateRunner {
    pub fn new(gates: Vec<Box<dyn QualityGate>>, max_retries: u32) -> Self {
        Self { gates, max_retries }
    }

    /// Build command gates from configured gate names and their commands
    ///
    /// Gates without a configured command are skipped with a warning.
    pub fn from_config(
        gate_names: &[String],
        commands: &std::collections::HashMap<String, String>,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        let mut gates: Vec<Box<dyn QualityGate>> = Vec::new();
        for name in gate_names {
            match commands.get(name) {
                Some(command) => gates.push(Box::new(CommandGate::new(name, command, timeout))),
                None => warn!(gate = %name, "no command configured for gate, skipping"),
            }
        }
        Self::new(gates, max_retries)
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Run every gate in order; returns all final outcomes
    ///
    /// A gate that fails is retried up to `max_retries` times before its
    /// failure is recorded. Later gates still run, so the report is
    /// complete.
    pub async fn run_all(&self, dir: &Path, emitter: &EventEmitter) -> eyre::Result<Vec<GateOutcome>> {
        let mut outcomes = Vec::with_capacity(self.gates.len());

        for gate in &self.gates {
            let mut outcome = gate.run(dir).await?;
            let mut attempt = 0;
            while !outcome.passed && attempt < self.max_retries {
                attempt += 1;
                info!(gate = gate.name(), attempt, "gate failed, retrying");
                outcome = gate.run(dir).await?;
            }

            emitter.quality_gate(gate.name(), outcome.passed);
            if outcome.passed {
                debug!(gate = gate.name(), "gate passed");
            } else {
                warn!(gate = gate.name(), exit_code = outcome.exit_code, "gate failed");
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
