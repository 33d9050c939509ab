//! CSV export of the observation and difference tables, for the external
//! reporting workflow. The watcher itself never calls into this module.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::store::{ObservationStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Write every observation row to a CSV file. Returns the row count.
pub fn export_observations_csv<P: AsRef<Path>>(
    store: &ObservationStore,
    path: P,
) -> Result<usize, ExportError> {
    let observations = store.observations()?;
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "id,timestamp,kind,subject_key,signal_payload")?;
    for obs in &observations {
        let payload = serde_json::to_string(&obs.payload)?;
        writeln!(
            out,
            "{},{},{},{},{}",
            obs.id,
            csv_field(&obs.timestamp),
            obs.kind,
            csv_field(&obs.subject_key),
            csv_field(&payload)
        )?;
    }
    out.flush()?;
    Ok(observations.len())
}

/// Write every difference row to a CSV file. Returns the row count.
pub fn export_differences_csv<P: AsRef<Path>>(
    store: &ObservationStore,
    path: P,
) -> Result<usize, ExportError> {
    let differences = store.differences()?;
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(
        out,
        "id,timestamp,kind,subject_key,signal_payload,difference_summary"
    )?;
    for diff in &differences {
        let payload = serde_json::to_string(&diff.payload)?;
        writeln!(
            out,
            "{},{},{},{},{},{}",
            diff.id,
            csv_field(&diff.timestamp),
            diff.kind,
            csv_field(&diff.subject_key),
            csv_field(&payload),
            csv_field(&diff.difference)
        )?;
    }
    out.flush()?;
    Ok(differences.len())
}

/// RFC 4180 quoting: fields containing commas, quotes or newlines are quoted,
/// with embedded quotes doubled.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
