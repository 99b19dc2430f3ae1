use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use fraudprep::{
    log_app_start, log_pipeline_finish, resolve_batch, sanitize_batch, RangeIndex, RawTransaction,
    LoggingConfig,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn raw_row(user_id: u64, ip: &str) -> RawTransaction {
    RawTransaction {
        user_id,
        signup_time: "2015-02-24 22:55:49".to_string(),
        purchase_time: "2015-04-18 02:47:11".to_string(),
        purchase_value: 34.0,
        device_id: "QVPSPJUOCKZAR".to_string(),
        source: "SEO".to_string(),
        browser: "Chrome".to_string(),
        sex: "M".to_string(),
        age: Some(39.0),
        ip_address: ip.to_string(),
        class: 0,
    }
}

#[test]
fn sanitize_and_resolve_emit_start_and_finish_events() {
    let logs = capture_logs(Level::INFO, || {
        let (clean, _) =
            sanitize_batch(vec![raw_row(1, "192.168.1.1")]).expect("sanitize succeeds");
        let index = RangeIndex::build(Vec::new());
        let _ = resolve_batch(clean, &index);
    });

    assert!(logs.contains("\"event\":\"sanitize.start\""));
    assert!(logs.contains("\"event\":\"sanitize.finish\""));
    assert!(logs.contains("\"event\":\"geolocate.index.built\""));
    assert!(logs.contains("\"event\":\"geolocate.resolve.start\""));
    assert!(logs.contains("\"event\":\"geolocate.resolve.finish\""));
}

#[test]
fn empty_index_is_reported_as_a_degenerate_case() {
    let logs = capture_logs(Level::INFO, || {
        let (clean, _) =
            sanitize_batch(vec![raw_row(1, "192.168.1.1")]).expect("sanitize succeeds");
        let index = RangeIndex::build(Vec::new());
        let _ = resolve_batch(clean, &index);
    });

    assert!(logs.contains("\"event\":\"geolocate.resolve.empty_index\""));
}

#[test]
fn lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start(&cfg);
        log_pipeline_finish(10, 10, 4);
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"pipeline.finish\""));
}
