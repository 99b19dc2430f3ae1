//! Fraud-dataset preparation crate.
//!
//! Implemented scope:
//! - dotted-decimal IPv4 encoding
//! - batch sanitation (timestamps, median imputation, p99 capping, dedup)
//! - range-based IP-to-country resolution over a sorted interval index
//! - feature-plan fit/apply producing a numeric model-input matrix
//! - CSV collaborators for the source and output tables

mod dataset;
mod features;
mod geolocate;
mod ip;
mod observability;
mod sanitize;

pub use dataset::{
    read_country_ranges_csv, read_transactions_csv, write_feature_matrix_csv, write_resolved_csv,
    DatasetError,
};
pub use features::{
    apply_feature_plan, assert_plan_compatible, fit_feature_plan, fit_transform, CategoryEncoder,
    FeatureError, FeatureMatrix, FeaturePlan, NumericScaler, FEATURE_PLAN_VERSION,
};
pub use geolocate::{
    resolve_batch, CountryRange, RangeIndex, ResolveReport, ResolvedTransaction, UNKNOWN_COUNTRY,
};
pub use ip::{encode_ipv4, IpParseError};
pub use observability::{
    init_logging, log_app_start, log_pipeline_finish, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use sanitize::{sanitize_batch, RawTransaction, SanitizeError, SanitizeReport, Transaction};
