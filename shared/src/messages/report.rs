//! Final application report
//!
//! The resource manager persists one report per application when the master
//! unregisters. The submission client reads it back to decide its exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{SharedError, SharedResult};
use crate::types::FinalApplicationStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationReport {
    pub app_id: String,
    pub final_status: FinalApplicationStatus,
    pub diagnostics: String,
    pub finished_at: DateTime<Utc>,
}

impl ApplicationReport {
    pub fn new(app_id: impl Into<String>, final_status: FinalApplicationStatus, diagnostics: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            final_status,
            diagnostics: diagnostics.into(),
            finished_at: Utc::now(),
        }
    }

    /// Location of the report for `app_id` under `log_dir`
    pub fn path_for(log_dir: &Path, app_id: &str) -> PathBuf {
        log_dir.join(format!("{app_id}-report.json"))
    }

    pub fn to_json(&self) -> SharedResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SharedError::ReportError {
            path: self.app_id.clone(),
            message: e.to_string(),
        })
    }

    pub fn from_json(path: &Path, json: &str) -> SharedResult<Self> {
        serde_json::from_str(json).map_err(|e| SharedError::ReportError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
