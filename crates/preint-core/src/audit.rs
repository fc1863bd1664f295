//! Audit records: the immutable summary attached to a finished run.
//!
//! An [`AuditRecord`] is built once, after the outcome of a run is final, and
//! exposes only getters. [`AuditLog`] keeps records durably as JSON Lines so
//! they can be inspected after the process exits.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::change::Revision;
use crate::domain::context::IntegrationContext;
use crate::domain::error::Result;
use crate::domain::outcome::Outcome;

/// What was integrated, onto what, from where, and under which credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    run_id: Uuid,
    triggered_branch: String,
    triggered_revision: Revision,
    integration_branch: String,
    repository_name: String,
    credentials_id: Option<String>,
    outcome: String,
    recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        run_id: Uuid,
        ctx: &IntegrationContext,
        triggered_revision: Revision,
        outcome: &Outcome,
    ) -> Self {
        Self {
            run_id,
            triggered_branch: ctx.triggered_branch.qualified(),
            triggered_revision,
            integration_branch: ctx.integration_branch.branch_name.clone(),
            repository_name: ctx.repository_name().to_string(),
            credentials_id: ctx.credentials_id.clone(),
            outcome: outcome.label().to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Qualified triggered branch, e.g. `origin/feature/x`.
    pub fn triggered_branch(&self) -> &str {
        &self.triggered_branch
    }

    pub fn triggered_revision(&self) -> &Revision {
        &self.triggered_revision
    }

    pub fn integration_branch(&self) -> &str {
        &self.integration_branch
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn credentials_id(&self) -> Option<&str> {
        self.credentials_id.as_deref()
    }

    /// Outcome label, e.g. `Integrated` or `IntegrationFailed`.
    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// SHA-256 hex digest of the record's JSON form.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Append-only JSON Lines file of audit records.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line, creating the file if needed.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// All records in append order. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
