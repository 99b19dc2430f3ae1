//! Range-based IP-to-country resolution.
//!
//! The index is a sorted table of disjoint inclusive address ranges. Batch
//! resolution sorts the record keys once and walks records and ranges together in
//! a single merge, taking for each key the range with the greatest lower bound not
//! exceeding it and accepting the match only when the upper bound also covers the
//! key. Keys in a gap between ranges, below every range, or unparseable resolve to
//! the `"Unknown"` sentinel instead of failing the batch.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ip::encode_ipv4;
use crate::sanitize::Transaction;

/// Sentinel country code for records no range covers.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// One address range and its owning country. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRange {
    pub lower: u32,
    pub upper: u32,
    pub country: String,
}

/// Immutable lookup table over non-overlapping address ranges, sorted ascending
/// by lower bound. Built once, then shared freely across batches and threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeIndex {
    entries: Vec<CountryRange>,
}

impl RangeIndex {
    pub fn build(mut entries: Vec<CountryRange>) -> Self {
        // Stable sort, then drop later entries sharing a lower bound: the first
        // entry at a given lower bound stays authoritative.
        entries.sort_by_key(|entry| entry.lower);
        entries.dedup_by_key(|entry| entry.lower);
        info!(
            component = "geolocate",
            event = "geolocate.index.built",
            range_count = entries.len()
        );
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest-lower-bound lookup for a single key.
    pub fn lookup(&self, key: u32) -> Option<&str> {
        let candidate = self.entries.partition_point(|entry| entry.lower <= key);
        if candidate == 0 {
            return None;
        }
        let entry = &self.entries[candidate - 1];
        (entry.upper >= key).then_some(entry.country.as_str())
    }
}

/// Transaction enriched with its resolved country code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTransaction {
    pub user_id: u64,
    pub signup_time: chrono::NaiveDateTime,
    pub purchase_time: chrono::NaiveDateTime,
    pub purchase_value: f64,
    pub device_id: String,
    pub source: String,
    pub browser: String,
    pub sex: String,
    pub age: f64,
    pub ip_address: String,
    pub class: u8,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub invalid_ips: u64,
}

/// Resolves a full batch against the index, preserving input order.
///
/// Resolution is infallible: every failure shape degrades to the sentinel and is
/// counted in the report.
pub fn resolve_batch(
    records: Vec<Transaction>,
    index: &RangeIndex,
) -> (Vec<ResolvedTransaction>, ResolveReport) {
    info!(
        component = "geolocate",
        event = "geolocate.resolve.start",
        record_count = records.len(),
        range_count = index.len()
    );

    if index.is_empty() && !records.is_empty() {
        warn!(
            component = "geolocate",
            event = "geolocate.resolve.empty_index",
            record_count = records.len()
        );
    }

    let mut invalid_ips = 0u64;
    let mut keyed: Vec<(usize, Option<u32>)> = records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let key = match encode_ipv4(&record.ip_address) {
                Ok(key) => Some(key),
                Err(_) => {
                    invalid_ips += 1;
                    None
                }
            };
            (position, key)
        })
        .collect();

    // Absent keys sort first and fall through the merge unmatched.
    keyed.sort_by_key(|&(_, key)| key);

    let mut countries: Vec<Option<String>> = vec![None; records.len()];
    let mut matched = 0u64;
    let mut candidate: Option<usize> = None;
    let mut next_range = 0usize;

    for (position, key) in keyed {
        let assigned = key.and_then(|k| {
            while next_range < index.entries.len() && index.entries[next_range].lower <= k {
                candidate = Some(next_range);
                next_range += 1;
            }
            let entry = &index.entries[candidate?];
            (entry.upper >= k).then(|| entry.country.clone())
        });

        if assigned.is_some() {
            matched += 1;
        }
        countries[position] = Some(assigned.unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()));
    }

    let total = records.len() as u64;
    let resolved: Vec<ResolvedTransaction> = records
        .into_iter()
        .zip(countries)
        .map(|(record, country)| {
            let country = country.expect("every position is assigned by the merge");
            ResolvedTransaction {
                user_id: record.user_id,
                signup_time: record.signup_time,
                purchase_time: record.purchase_time,
                purchase_value: record.purchase_value,
                device_id: record.device_id,
                source: record.source,
                browser: record.browser,
                sex: record.sex,
                age: record.age,
                ip_address: record.ip_address,
                class: record.class,
                country,
            }
        })
        .collect();

    let report = ResolveReport {
        total,
        matched,
        unmatched: total - matched,
        invalid_ips,
    };

    info!(
        component = "geolocate",
        event = "geolocate.resolve.finish",
        total = report.total,
        matched = report.matched,
        unmatched = report.unmatched,
        invalid_ips = report.invalid_ips
    );

    (resolved, report)
}
