use std::path::PathBuf;

use fraudprep::{
    fit_transform, init_logging, log_app_start, log_pipeline_finish, logging_config_from_env,
    read_country_ranges_csv, read_transactions_csv, resolve_batch, sanitize_batch,
    write_feature_matrix_csv, write_resolved_csv, RangeIndex, ResolveReport, SanitizeReport,
};
use serde::Serialize;

const NUMERIC_FIELDS: [&str; 2] = ["purchase_value", "age"];
const CATEGORICAL_FIELDS: [&str; 4] = ["country", "source", "browser", "sex"];

#[derive(Debug, Serialize)]
struct RunReport {
    sanitize: SanitizeReport,
    resolve: ResolveReport,
    plan_fingerprint: String,
    matrix_rows: usize,
    matrix_columns: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let mut args = std::env::args().skip(1);
    let (transactions_path, ranges_path, out_dir) = match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), Some(c)) => (PathBuf::from(a), PathBuf::from(b), PathBuf::from(c)),
        _ => {
            eprintln!("usage: prepare_dataset <transactions.csv> <ip_ranges.csv> <out_dir>");
            std::process::exit(2);
        }
    };

    let raw = read_transactions_csv(&transactions_path)?;
    let ranges = read_country_ranges_csv(&ranges_path)?;

    let (clean, sanitize_report) = sanitize_batch(raw)?;
    let index = RangeIndex::build(ranges);
    let (resolved, resolve_report) = resolve_batch(clean, &index);
    let (plan, matrix) = fit_transform(&resolved, &NUMERIC_FIELDS, &CATEGORICAL_FIELDS)?;

    std::fs::create_dir_all(&out_dir)?;
    write_resolved_csv(&out_dir.join("resolved_transactions.csv"), &resolved)?;
    write_feature_matrix_csv(&out_dir.join("feature_matrix.csv"), &matrix)?;

    log_pipeline_finish(resolved.len(), matrix.rows.len(), matrix.columns.len());

    let report = RunReport {
        sanitize: sanitize_report,
        resolve: resolve_report,
        plan_fingerprint: plan.fingerprint,
        matrix_rows: matrix.rows.len(),
        matrix_columns: matrix.columns.len(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
