//! Model-input feature preparation: standardized numerics plus one-hot encoded
//! categoricals with the reference level dropped.
//!
//! Fitting and applying are separate steps. `fit_feature_plan` computes the
//! scaler and encoder parameters over a batch and freezes them into an immutable
//! `FeaturePlan`; `apply_feature_plan` turns any batch into a numeric matrix
//! under that plan. The plan carries a fingerprint so a persisted plan can be
//! checked against the code that re-uses it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::geolocate::ResolvedTransaction;

pub const FEATURE_PLAN_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub field: String,
    pub mean: f64,
    pub std: f64,
}

/// Categories are sorted; the first one is the dropped reference level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    pub field: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePlan {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
    pub scalers: Vec<NumericScaler>,
    pub encoders: Vec<CategoryEncoder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("cannot fit a feature plan over an empty batch")]
    EmptyBatch,
    #[error("column '{field}' has category '{value}' not seen at fit time")]
    UnknownCategory { field: String, value: String },
    #[error("feature plan version mismatch: expected {expected}, got {actual}")]
    PlanVersionMismatch { expected: u32, actual: u32 },
    #[error("feature plan fingerprint mismatch: expected {expected}, got {actual}")]
    PlanFingerprintMismatch { expected: String, actual: String },
}

/// Fits scaler and encoder parameters over the batch.
pub fn fit_feature_plan(
    records: &[ResolvedTransaction],
    numeric_fields: &[&str],
    categorical_fields: &[&str],
) -> Result<FeaturePlan, FeatureError> {
    if records.is_empty() {
        return Err(FeatureError::EmptyBatch);
    }

    let mut scalers = Vec::with_capacity(numeric_fields.len());
    for field in numeric_fields {
        let values: Vec<f64> = records
            .iter()
            .map(|record| numeric_value(record, field))
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| FeatureError::UnknownColumn(field.to_string()))?;

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / values.len() as f64;
        let std = variance.sqrt();
        scalers.push(NumericScaler {
            field: field.to_string(),
            mean,
            // A constant column scales by 1 so it maps to zeros instead of NaN.
            std: if std == 0.0 { 1.0 } else { std },
        });
    }

    let mut encoders = Vec::with_capacity(categorical_fields.len());
    for field in categorical_fields {
        let mut categories = BTreeSet::new();
        for record in records {
            let value = categorical_value(record, field)
                .ok_or_else(|| FeatureError::UnknownColumn(field.to_string()))?;
            categories.insert(value.to_string());
        }
        encoders.push(CategoryEncoder {
            field: field.to_string(),
            categories: categories.into_iter().collect(),
        });
    }

    let columns = output_columns(&scalers, &encoders);
    let fingerprint = plan_fingerprint(FEATURE_PLAN_VERSION, &scalers, &encoders);

    info!(
        component = "features",
        event = "features.plan.fitted",
        version = FEATURE_PLAN_VERSION,
        numeric_fields = scalers.len(),
        categorical_fields = encoders.len(),
        column_count = columns.len(),
        fitted_over = records.len(),
        fingerprint = fingerprint
    );

    Ok(FeaturePlan {
        version: FEATURE_PLAN_VERSION,
        fingerprint,
        columns,
        scalers,
        encoders,
    })
}

/// Applies a fitted plan to a batch, producing one matrix row per record.
pub fn apply_feature_plan(
    plan: &FeaturePlan,
    records: &[ResolvedTransaction],
) -> Result<FeatureMatrix, FeatureError> {
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let mut row = Vec::with_capacity(plan.columns.len());

        for scaler in &plan.scalers {
            let value = numeric_value(record, &scaler.field)
                .ok_or_else(|| FeatureError::UnknownColumn(scaler.field.clone()))?;
            row.push((value - scaler.mean) / scaler.std);
        }

        for encoder in &plan.encoders {
            let value = categorical_value(record, &encoder.field)
                .ok_or_else(|| FeatureError::UnknownColumn(encoder.field.clone()))?;
            let level = encoder
                .categories
                .iter()
                .position(|category| category == value)
                .ok_or_else(|| FeatureError::UnknownCategory {
                    field: encoder.field.clone(),
                    value: value.to_string(),
                })?;
            // Reference level (index 0) contributes no column.
            for candidate in 1..encoder.categories.len() {
                row.push(if candidate == level { 1.0 } else { 0.0 });
            }
        }

        rows.push(row);
    }

    info!(
        component = "features",
        event = "features.matrix.applied",
        row_count = rows.len(),
        column_count = plan.columns.len()
    );

    Ok(FeatureMatrix {
        columns: plan.columns.clone(),
        rows,
    })
}

/// Fits a plan over the batch and immediately applies it.
pub fn fit_transform(
    records: &[ResolvedTransaction],
    numeric_fields: &[&str],
    categorical_fields: &[&str],
) -> Result<(FeaturePlan, FeatureMatrix), FeatureError> {
    let plan = fit_feature_plan(records, numeric_fields, categorical_fields)?;
    let matrix = apply_feature_plan(&plan, records)?;
    Ok((plan, matrix))
}

pub fn assert_plan_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeaturePlan,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::PlanVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::PlanFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn numeric_value(record: &ResolvedTransaction, field: &str) -> Option<f64> {
    match field {
        "purchase_value" => Some(record.purchase_value),
        "age" => Some(record.age),
        _ => None,
    }
}

fn categorical_value<'a>(record: &'a ResolvedTransaction, field: &str) -> Option<&'a str> {
    match field {
        "country" => Some(record.country.as_str()),
        "device_id" => Some(record.device_id.as_str()),
        "source" => Some(record.source.as_str()),
        "browser" => Some(record.browser.as_str()),
        "sex" => Some(record.sex.as_str()),
        _ => None,
    }
}

fn output_columns(scalers: &[NumericScaler], encoders: &[CategoryEncoder]) -> Vec<String> {
    let mut columns = Vec::new();
    for scaler in scalers {
        columns.push(scaler.field.clone());
    }
    for encoder in encoders {
        for category in encoder.categories.iter().skip(1) {
            columns.push(format!("{}_{}", encoder.field, category));
        }
    }
    columns
}

fn plan_fingerprint(version: u32, scalers: &[NumericScaler], encoders: &[CategoryEncoder]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("numeric:");
    for scaler in scalers {
        hasher.update(scaler.field.as_bytes());
        hasher.update(format!(
            ":{:x}:{:x};",
            scaler.mean.to_bits(),
            scaler.std.to_bits()
        ));
    }
    hasher.update(";categorical:");
    for encoder in encoders {
        hasher.update(encoder.field.as_bytes());
        hasher.update(":");
        for category in &encoder.categories {
            hasher.update(category.as_bytes());
            hasher.update(",");
        }
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}
