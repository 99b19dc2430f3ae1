//! Batch sanitizer for raw fraud-detection transaction rows.
//!
//! One pass over the whole batch: parse timestamps, impute missing ages with the
//! batch median, cap purchase values at the batch's 99th percentile, then drop
//! exact duplicates. Re-running the sanitizer on its own output is a no-op.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CAP_QUANTILE: f64 = 0.99;

/// Transaction row as read from the source table, before any cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub user_id: u64,
    pub signup_time: String,
    pub purchase_time: String,
    pub purchase_value: f64,
    pub device_id: String,
    pub source: String,
    pub browser: String,
    pub sex: String,
    pub age: Option<f64>,
    pub ip_address: String,
    pub class: u8,
}

/// Sanitized transaction row. Timestamps are parsed and `age` is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub user_id: u64,
    pub signup_time: NaiveDateTime,
    pub purchase_time: NaiveDateTime,
    pub purchase_value: f64,
    pub device_id: String,
    pub source: String,
    pub browser: String,
    pub sex: String,
    pub age: f64,
    pub ip_address: String,
    pub class: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub input_rows: u64,
    pub output_rows: u64,
    pub duplicates_removed: u64,
    pub ages_imputed: u64,
    pub values_capped: u64,
    pub age_median: Option<f64>,
    pub purchase_value_cap: Option<f64>,
}

impl SanitizeReport {
    fn empty() -> Self {
        Self {
            input_rows: 0,
            output_rows: 0,
            duplicates_removed: 0,
            ages_imputed: 0,
            values_capped: 0,
            age_median: None,
            purchase_value_cap: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("row {row}: unparseable {field} '{value}'")]
    InvalidTimestamp {
        row: u64,
        field: &'static str,
        value: String,
    },
    #[error("age median undefined: no present age values in a non-empty batch")]
    NoAgeValues,
}

/// Sanitizes a full batch, returning fresh rows plus a mutation report.
///
/// Timestamp parse failures abort the batch; every other repair is counted in
/// the report and applied in place of the raw value.
pub fn sanitize_batch(
    rows: Vec<RawTransaction>,
) -> Result<(Vec<Transaction>, SanitizeReport), SanitizeError> {
    info!(
        component = "sanitize",
        event = "sanitize.start",
        input_rows = rows.len()
    );

    if rows.is_empty() {
        return Ok((Vec::new(), SanitizeReport::empty()));
    }

    let input_rows = rows.len() as u64;
    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        parsed.push(parse_row(row)?);
    }

    let (age_median, ages_imputed) = impute_ages(&mut parsed)?;
    let (purchase_value_cap, values_capped) = cap_purchase_values(&mut parsed);
    let (deduped, duplicates_removed) = drop_exact_duplicates(parsed);

    let report = SanitizeReport {
        input_rows,
        output_rows: deduped.len() as u64,
        duplicates_removed,
        ages_imputed,
        values_capped,
        age_median,
        purchase_value_cap,
    };

    info!(
        component = "sanitize",
        event = "sanitize.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        duplicates_removed = report.duplicates_removed,
        ages_imputed = report.ages_imputed,
        values_capped = report.values_capped
    );

    Ok((deduped, report))
}

fn parse_row(row: RawTransaction) -> Result<Transaction, SanitizeError> {
    let signup_time = parse_timestamp(row.user_id, "signup_time", &row.signup_time)?;
    let purchase_time = parse_timestamp(row.user_id, "purchase_time", &row.purchase_time)?;

    Ok(Transaction {
        user_id: row.user_id,
        signup_time,
        purchase_time,
        purchase_value: row.purchase_value,
        device_id: row.device_id,
        source: row.source,
        browser: row.browser,
        sex: row.sex,
        // Placeholder until the batch median is known.
        age: row.age.unwrap_or(f64::NAN),
        ip_address: row.ip_address,
        class: row.class,
    })
}

fn parse_timestamp(
    row: u64,
    field: &'static str,
    value: &str,
) -> Result<NaiveDateTime, SanitizeError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        SanitizeError::InvalidTimestamp {
            row,
            field,
            value: value.to_string(),
        }
    })
}

fn impute_ages(rows: &mut [Transaction]) -> Result<(Option<f64>, u64), SanitizeError> {
    let mut present: Vec<f64> = rows.iter().map(|t| t.age).filter(|a| !a.is_nan()).collect();
    let missing = rows.len() - present.len();

    if present.is_empty() {
        if missing > 0 {
            return Err(SanitizeError::NoAgeValues);
        }
        return Ok((None, 0));
    }

    present.sort_by(|a, b| a.partial_cmp(b).expect("present ages are never NaN"));
    let median = interpolated_quantile(&present, 0.5);

    let mut imputed = 0u64;
    for row in rows.iter_mut() {
        if row.age.is_nan() {
            row.age = median;
            imputed += 1;
        }
    }

    Ok((Some(median), imputed))
}

fn cap_purchase_values(rows: &mut [Transaction]) -> (Option<f64>, u64) {
    let mut present: Vec<f64> = rows
        .iter()
        .map(|t| t.purchase_value)
        .filter(|v| v.is_finite())
        .collect();
    if present.is_empty() {
        return (None, 0);
    }

    present.sort_by(|a, b| a.partial_cmp(b).expect("present values are never NaN"));
    // Amounts are inherently non-negative, so the floor stays at zero even if the
    // whole batch sits below it.
    let cap = lower_quantile(&present, CAP_QUANTILE).max(0.0);

    let mut capped = 0u64;
    for row in rows.iter_mut() {
        if !row.purchase_value.is_finite() {
            continue;
        }
        let clamped = row.purchase_value.clamp(0.0, cap);
        if clamped != row.purchase_value {
            row.purchase_value = clamped;
            capped += 1;
        }
    }

    (Some(cap), capped)
}

/// Quantile as the order statistic at the floored position. The cap must be an
/// actual data value: clamping at an interpolated cap would shrink the quantile
/// of the capped batch and re-cap on the next pass.
fn lower_quantile(sorted: &[f64], q: f64) -> f64 {
    let position = ((sorted.len() - 1) as f64 * q).floor() as usize;
    sorted[position]
}

/// Quantile with linear interpolation between the two nearest order statistics.
/// Input must be sorted ascending and non-empty.
fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let fraction = position - lower as f64;
    if lower + 1 < sorted.len() {
        sorted[lower] + (sorted[lower + 1] - sorted[lower]) * fraction
    } else {
        sorted[lower]
    }
}

fn drop_exact_duplicates(rows: Vec<Transaction>) -> (Vec<Transaction>, u64) {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut out = Vec::with_capacity(rows.len());
    let mut removed = 0u64;

    for row in rows {
        if seen.insert(dedup_key(&row)) {
            out.push(row);
        } else {
            removed += 1;
        }
    }

    (out, removed)
}

type DedupKey = (
    u64,
    NaiveDateTime,
    NaiveDateTime,
    u64,
    String,
    String,
    String,
    String,
    u64,
    String,
    u8,
);

// f64 fields hash by bit pattern so the key matches exact field equality.
fn dedup_key(row: &Transaction) -> DedupKey {
    (
        row.user_id,
        row.signup_time,
        row.purchase_time,
        row.purchase_value.to_bits(),
        row.device_id.clone(),
        row.source.clone(),
        row.browser.clone(),
        row.sex.clone(),
        row.age.to_bits(),
        row.ip_address.clone(),
        row.class,
    )
}
