use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::delivery::fanout::FanoutReport;
use crate::signals::types::{Alert, SignalKey};

const HEADER: &str =
    "timestamp,signal_key,ticker,strategy,persisted,recipients,queued,skipped,chunks_failed,tickets_error";

/// Append-only CSV trail of webhook dispatches.
pub struct CsvLogger {
    log_path: String,
    // serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Log one dispatch
    pub fn log_dispatch(
        &self,
        alert: &Alert,
        key: Option<SignalKey>,
        persisted: bool,
        report: &FanoutReport,
    ) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?;

        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{}",
            Utc::now().to_rfc3339(),
            key.map(|k| k.as_str()).unwrap_or("unclassified"),
            csv_field(&alert.ticker),
            csv_field(&alert.strategy),
            persisted,
            report.recipients,
            report.queued,
            report.skipped(),
            report.chunks_failed,
            report.tickets_error,
        )?;

        Ok(())
    }
}

/// Quote fields that would break the row.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
