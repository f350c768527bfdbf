//! JSON Lines action log, one file per UTC day.

use super::{VaultLayout, run_blocking_with};
use crate::task::ports::{ActionLog, ActionLogEntry, ActionLogError};
use async_trait::async_trait;
use cap_std::fs::OpenOptions;
use chrono::NaiveDate;
use std::io::{self, BufRead, BufReader, Write};

/// Append-only action log stored under the vault's `Logs` folder.
#[derive(Debug, Clone)]
pub struct FileActionLog {
    layout: VaultLayout,
}

impl FileActionLog {
    /// Creates a log over an opened vault.
    #[must_use]
    pub const fn new(layout: VaultLayout) -> Self {
        Self { layout }
    }

    /// Returns the log file name for `day`.
    #[must_use]
    pub fn file_name(day: NaiveDate) -> String {
        format!("actions_{}.jsonl", day.format("%Y-%m-%d"))
    }

    /// Reads back every entry for `day` in append order.
    ///
    /// Lines that do not parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ActionLogError::Unavailable`] when the file exists but
    /// cannot be read.
    pub async fn read_day(&self, day: NaiveDate) -> Result<Vec<ActionLogEntry>, ActionLogError> {
        let layout = self.layout.clone();
        run_blocking_with(
            move || {
                let file = match layout.logs().open(Self::file_name(day)) {
                    Ok(file) => file.into_std(),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(err) => return Err(ActionLogError::unavailable(err)),
                };
                let mut entries: Vec<ActionLogEntry> = Vec::new();
                for line in BufReader::new(file).lines() {
                    let text = line.map_err(ActionLogError::unavailable)?;
                    match serde_json::from_str(&text) {
                        Ok(entry) => entries.push(entry),
                        Err(err) => tracing::warn!(error = %err, "skipping unreadable log line"),
                    }
                }
                Ok(entries)
            },
            ActionLogError::unavailable,
        )
        .await
    }
}

#[async_trait]
impl ActionLog for FileActionLog {
    async fn append(&self, entry: &ActionLogEntry) -> Result<(), ActionLogError> {
        let mut line =
            serde_json::to_vec(entry).map_err(|err| ActionLogError::Encoding(err.to_string()))?;
        line.push(b'\n');
        let name = Self::file_name(entry.at.date_naive());
        let layout = self.layout.clone();
        run_blocking_with(
            move || {
                let mut options = OpenOptions::new();
                options.append(true).create(true);
                let mut file = layout
                    .logs()
                    .open_with(&name, &options)
                    .map_err(ActionLogError::unavailable)?
                    .into_std();
                // One write per entry keeps concurrent appenders from
                // interleaving within a line.
                file.write_all(&line).map_err(ActionLogError::unavailable)
            },
            ActionLogError::unavailable,
        )
        .await
    }
}
