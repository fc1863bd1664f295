//! Host run seam: how the orchestrator reports back to whatever triggered
//! the build.

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::env::Environment;
use crate::messages;

/// Status of a build as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    /// Not a failure: there was nothing to integrate.
    NotBuilt,
    Failure,
}

impl BuildResult {
    /// Process exit code the CLI uses for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildResult::Success => 0,
            BuildResult::Failure => 1,
            BuildResult::NotBuilt => 2,
        }
    }
}

/// One build run owned by the host.
pub trait BuildRun: Send {
    /// Environment used to expand branch and repository templates.
    fn environment(&self) -> &Environment;

    fn result(&self) -> Option<BuildResult>;

    fn set_result(&mut self, result: BuildResult);

    /// Attach the run's audit record. Called at most once per run.
    fn attach_audit_record(&mut self, record: AuditRecord);

    /// Write a line to the run's console.
    fn console(&mut self, line: &str);
}

/// In-process build run that keeps everything in memory.
#[derive(Debug, Default)]
pub struct LocalRun {
    environment: Environment,
    result: Option<BuildResult>,
    audit_records: Vec<AuditRecord>,
    console: Vec<String>,
    echo: bool,
}

impl LocalRun {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    /// Also log console lines through `tracing`.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn audit_records(&self) -> &[AuditRecord] {
        &self.audit_records
    }

    pub fn audit_record(&self) -> Option<&AuditRecord> {
        self.audit_records.last()
    }

    pub fn console_lines(&self) -> &[String] {
        &self.console
    }

    /// Console output joined with newlines.
    pub fn console_text(&self) -> String {
        self.console.join("\n")
    }
}

impl BuildRun for LocalRun {
    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn result(&self) -> Option<BuildResult> {
        self.result
    }

    fn set_result(&mut self, result: BuildResult) {
        self.result = Some(result);
    }

    fn attach_audit_record(&mut self, record: AuditRecord) {
        self.audit_records.push(record);
    }

    fn console(&mut self, line: &str) {
        if self.echo {
            tracing::info!("{}", line.trim_start_matches(messages::LOG_PREFIX));
        }
        self.console.push(line.to_string());
    }
}
