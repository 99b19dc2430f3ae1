use chrono::NaiveDate;
use fraudprep::{
    resolve_batch, CountryRange, RangeIndex, Transaction, UNKNOWN_COUNTRY,
};

fn transaction(user_id: u64, ip: &str) -> Transaction {
    let ts = NaiveDate::from_ymd_opt(2015, 2, 24)
        .expect("valid date")
        .and_hms_opt(22, 8, 31)
        .expect("valid time");
    Transaction {
        user_id,
        signup_time: ts,
        purchase_time: ts,
        purchase_value: 34.0,
        device_id: "QVPSPJUOCKZAR".to_string(),
        source: "SEO".to_string(),
        browser: "Chrome".to_string(),
        sex: "M".to_string(),
        age: 39.0,
        ip_address: ip.to_string(),
        class: 0,
    }
}

fn range(lower: u32, upper: u32, country: &str) -> CountryRange {
    CountryRange {
        lower,
        upper,
        country: country.to_string(),
    }
}

#[test]
fn covered_ip_matches_and_uncovered_ip_gets_the_sentinel() {
    let index = RangeIndex::build(vec![range(3_232_235_776, 3_232_235_800, "US")]);
    let records = vec![transaction(1, "192.168.1.1"), transaction(2, "10.0.0.1")];

    let (resolved, report) = resolve_batch(records, &index);

    assert_eq!(resolved[0].user_id, 1);
    assert_eq!(resolved[0].country, "US");
    assert_eq!(resolved[1].user_id, 2);
    assert_eq!(resolved[1].country, UNKNOWN_COUNTRY);
    assert_eq!(report.total, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.invalid_ips, 0);
}

#[test]
fn keys_in_gaps_and_below_all_ranges_resolve_to_the_sentinel() {
    // 1.0.0.0..=1.0.0.255 and 3.0.0.0..=3.0.0.255, with a gap between.
    let index = RangeIndex::build(vec![
        range(16_777_216, 16_777_471, "AU"),
        range(50_331_648, 50_331_903, "DE"),
    ]);
    let records = vec![
        transaction(1, "0.255.255.255"), // below every lower bound
        transaction(2, "1.0.0.0"),       // exact lower bound
        transaction(3, "1.0.0.255"),     // exact upper bound
        transaction(4, "2.0.0.1"),       // gap between the two ranges
        transaction(5, "3.0.0.10"),
        transaction(6, "4.0.0.0"), // past the last range
    ];

    let (resolved, report) = resolve_batch(records, &index);
    let countries: Vec<&str> = resolved.iter().map(|r| r.country.as_str()).collect();

    assert_eq!(
        countries,
        vec![UNKNOWN_COUNTRY, "AU", "AU", UNKNOWN_COUNTRY, "DE", UNKNOWN_COUNTRY]
    );
    assert_eq!(report.matched, 3);
    assert_eq!(report.unmatched, 3);
}

#[test]
fn output_order_matches_input_order_despite_key_sorting() {
    let index = RangeIndex::build(vec![range(0, u32::MAX, "ZZ")]);
    let ips = [
        "200.1.2.3",
        "10.0.0.1",
        "not-an-ip",
        "250.250.250.250",
        "1.2.3.4",
    ];
    let records: Vec<Transaction> = ips
        .iter()
        .enumerate()
        .map(|(i, ip)| transaction(i as u64 + 1, ip))
        .collect();

    let (resolved, _) = resolve_batch(records, &index);

    for (i, record) in resolved.iter().enumerate() {
        assert_eq!(record.user_id, i as u64 + 1);
    }
}

#[test]
fn malformed_ips_are_counted_and_never_abort_the_batch() {
    let index = RangeIndex::build(vec![range(0, u32::MAX, "ZZ")]);
    let records = vec![
        transaction(1, "999.1.1.1"),
        transaction(2, ""),
        transaction(3, "1.2.3"),
        transaction(4, "8.8.8.8"),
    ];

    let (resolved, report) = resolve_batch(records, &index);

    assert_eq!(resolved[0].country, UNKNOWN_COUNTRY);
    assert_eq!(resolved[1].country, UNKNOWN_COUNTRY);
    assert_eq!(resolved[2].country, UNKNOWN_COUNTRY);
    assert_eq!(resolved[3].country, "ZZ");
    assert_eq!(report.invalid_ips, 3);
    assert_eq!(report.matched, 1);
}

#[test]
fn empty_index_degrades_to_everything_unmatched() {
    let index = RangeIndex::build(Vec::new());
    let records = vec![transaction(1, "8.8.8.8"), transaction(2, "1.1.1.1")];

    let (resolved, report) = resolve_batch(records, &index);

    assert!(resolved.iter().all(|r| r.country == UNKNOWN_COUNTRY));
    assert_eq!(report.matched, 0);
    assert_eq!(report.unmatched, 2);
}

#[test]
fn index_is_shared_across_threads_without_synchronization() {
    let index = RangeIndex::build(vec![
        range(16_777_216, 16_777_471, "AU"),
        range(3_232_235_776, 3_232_235_800, "US"),
    ]);

    std::thread::scope(|scope| {
        let a = scope.spawn(|| resolve_batch(vec![transaction(1, "192.168.1.1")], &index));
        let b = scope.spawn(|| resolve_batch(vec![transaction(2, "1.0.0.7")], &index));

        let (resolved_a, _) = a.join().expect("first batch resolves");
        let (resolved_b, _) = b.join().expect("second batch resolves");
        assert_eq!(resolved_a[0].country, "US");
        assert_eq!(resolved_b[0].country, "AU");
    });
}

#[test]
fn every_record_gets_exactly_one_assignment() {
    let index = RangeIndex::build(vec![range(100, 200, "US")]);
    let records: Vec<Transaction> = (0..50)
        .map(|i| transaction(i, &format!("0.0.0.{}", i * 5)))
        .collect();

    let (resolved, report) = resolve_batch(records, &index);

    assert_eq!(resolved.len(), 50);
    assert!(resolved.iter().all(|r| !r.country.is_empty()));
    assert_eq!(report.matched + report.unmatched, report.total);
}
