use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::models::PredictionRecord;

pub fn load_csv(path: &Path) -> anyhow::Result<Vec<PredictionRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let records = read_csv(file)?;
    info!(records = records.len(), path = %path.display(), "loaded records from CSV");
    Ok(records)
}

/// Rows that cannot be read (no usable evaluation month) are skipped.
pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Vec<PredictionRecord>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<PredictionRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(error) if error.is_io_error() => {
                return Err(error).context("failed to read CSV input");
            }
            Err(error) => warn!(row = index + 2, %error, "skipping unreadable row"),
        }
    }

    Ok(records)
}
