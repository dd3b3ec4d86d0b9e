//! Upload session state: the selected file, its headers and the column rules
//! that will be submitted.
//!
//! One `UploadState` exists per session and is owned by the caller; the job
//! controller borrows it mutably when submitting or resetting.

use crate::model::{ColumnRules, JobId, Operation, SanitizeRequest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Please upload a CSV file (got '{0}')")]
    NotCsv(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl SelectedFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name, size }
    }
}

/// State of the tri-state "select all columns" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectAllState {
    None,
    Partial,
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    selected_file: Option<SelectedFile>,
    headers: Vec<String>,
    rules: ColumnRules,
    current_job_id: Option<JobId>,
    // Last operation picked per column, kept while the column is disabled so
    // re-enabling restores it. Only `rules` is ever submitted.
    choices: BTreeMap<String, Operation>,
}

impl UploadState {
    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selected_file.as_ref()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rules(&self) -> &ColumnRules {
        &self.rules
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.current_job_id
    }

    pub(crate) fn set_current_job_id(&mut self, job_id: JobId) {
        self.current_job_id = Some(job_id);
    }

    /// Select a new input file. Anything not named `*.csv` is rejected
    /// without touching the current state.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), SessionError> {
        if !file.name.to_lowercase().ends_with(".csv") {
            return Err(SessionError::NotCsv(file.name));
        }
        self.reset();
        self.selected_file = Some(file);
        Ok(())
    }

    /// Replace the header list. Rules for columns that no longer exist are dropped.
    pub fn set_headers(&mut self, headers: Vec<String>) {
        self.rules.retain(|col, _| headers.contains(col));
        self.choices.retain(|col, _| headers.contains(col));
        self.headers = headers;
    }

    pub fn toggle_column(
        &mut self,
        column: &str,
        enabled: bool,
        operation: Operation,
    ) -> Result<(), SessionError> {
        self.ensure_header(column)?;
        self.choices.insert(column.to_string(), operation);
        if enabled {
            self.rules.insert(column.to_string(), operation);
        } else {
            self.rules.remove(column);
        }
        Ok(())
    }

    /// Change the chosen operation of a column. The submitted rules follow
    /// only if the column is currently enabled.
    pub fn set_operation(&mut self, column: &str, operation: Operation) -> Result<(), SessionError> {
        self.ensure_header(column)?;
        self.choices.insert(column.to_string(), operation);
        if let Some(op) = self.rules.get_mut(column) {
            *op = operation;
        }
        Ok(())
    }

    /// Last operation chosen for `column`, MASK if none was ever chosen.
    pub fn operation_for(&self, column: &str) -> Operation {
        self.choices.get(column).copied().unwrap_or_default()
    }

    pub fn is_enabled(&self, column: &str) -> bool {
        self.rules.contains_key(column)
    }

    /// Bulk toggle: every header gets `operation`, enabled or not per `enabled`.
    pub fn apply_default_to_all(&mut self, operation: Operation, enabled: impl Fn(&str) -> bool) {
        for col in &self.headers {
            self.choices.insert(col.clone(), operation);
            if enabled(col.as_str()) {
                self.rules.insert(col.clone(), operation);
            } else {
                self.rules.remove(col);
            }
        }
    }

    pub fn select_all_state(&self) -> SelectAllState {
        match self.rules.len() {
            0 => SelectAllState::None,
            n if n == self.headers.len() => SelectAllState::All,
            _ => SelectAllState::Partial,
        }
    }

    pub fn is_submittable(&self) -> bool {
        self.selected_file.is_some() && !self.rules.is_empty()
    }

    pub fn request(&self) -> SanitizeRequest {
        SanitizeRequest {
            columns: self.rules.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn ensure_header(&self, column: &str) -> Result<(), SessionError> {
        if self.headers.iter().any(|h| h == column) {
            Ok(())
        } else {
            Err(SessionError::UnknownColumn(column.to_string()))
        }
    }
}
