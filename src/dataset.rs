//! CSV collaborators for the two input tables and the two outputs.
//!
//! A missing or mistyped column fails deserialization of the whole file; partial
//! schemas never reach the transforms.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::features::FeatureMatrix;
use crate::geolocate::{CountryRange, ResolvedTransaction};
use crate::sanitize::RawTransaction;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("address bound {value} outside the 32-bit space")]
    RangeBounds { value: f64 },
}

// The source geolocation table stores bounds as floats ("1.6777e7").
#[derive(Debug, Deserialize)]
struct CountryRangeRow {
    lower_bound_ip_address: f64,
    upper_bound_ip_address: f64,
    country: String,
}

pub fn read_transactions_csv(path: &Path) -> Result<Vec<RawTransaction>, DatasetError> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<RawTransaction>, csv::Error>>()?;

    info!(
        component = "dataset",
        event = "dataset.transactions.read",
        path = %path.display(),
        row_count = rows.len()
    );

    Ok(rows)
}

pub fn read_country_ranges_csv(path: &Path) -> Result<Vec<CountryRange>, DatasetError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut ranges = Vec::new();
    for row in reader.deserialize() {
        let row: CountryRangeRow = row?;
        ranges.push(CountryRange {
            lower: bound_to_u32(row.lower_bound_ip_address)?,
            upper: bound_to_u32(row.upper_bound_ip_address)?,
            country: row.country,
        });
    }

    info!(
        component = "dataset",
        event = "dataset.ranges.read",
        path = %path.display(),
        range_count = ranges.len()
    );

    Ok(ranges)
}

pub fn write_resolved_csv(
    path: &Path,
    records: &[ResolvedTransaction],
) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!(
        component = "dataset",
        event = "dataset.resolved.written",
        path = %path.display(),
        row_count = records.len()
    );

    Ok(())
}

pub fn write_feature_matrix_csv(path: &Path, matrix: &FeatureMatrix) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&matrix.columns)?;
    for row in &matrix.rows {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    writer.flush()?;

    info!(
        component = "dataset",
        event = "dataset.matrix.written",
        path = %path.display(),
        row_count = matrix.rows.len(),
        column_count = matrix.columns.len()
    );

    Ok(())
}

fn bound_to_u32(value: f64) -> Result<u32, DatasetError> {
    let rounded = value.round();
    if !value.is_finite() || rounded < 0.0 || rounded > f64::from(u32::MAX) {
        return Err(DatasetError::RangeBounds { value });
    }
    Ok(rounded as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_round_trip_from_float_notation() {
        assert_eq!(bound_to_u32(16_777_216.0).unwrap(), 16_777_216);
        assert_eq!(bound_to_u32(0.0).unwrap(), 0);
        assert_eq!(bound_to_u32(4_294_967_295.0).unwrap(), u32::MAX);
    }

    #[test]
    fn out_of_domain_bounds_are_rejected() {
        assert!(matches!(
            bound_to_u32(-1.0),
            Err(DatasetError::RangeBounds { .. })
        ));
        assert!(matches!(
            bound_to_u32(4_294_967_296.0),
            Err(DatasetError::RangeBounds { .. })
        ));
        assert!(matches!(
            bound_to_u32(f64::NAN),
            Err(DatasetError::RangeBounds { .. })
        ));
    }
}
