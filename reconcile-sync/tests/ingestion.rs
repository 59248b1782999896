use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::BufReader;

use reconcile_core::{EntityId, ErrorPolicy, Record};
use reconcile_sync::cache::EntityCache;
use reconcile_sync::ingest::{exit_code, IngestOptions, Ingestor, RunReport, Termination};
use reconcile_sync::{
    ApiTranslator, DirectorySource, ErrorKind, Reconciler, RecordSource, SnapshotWriter, SyncError,
};

/// Directory source that counts how often it is asked.
#[derive(Clone)]
struct CountedSource {
    inner: DirectorySource,
    calls: Arc<AtomicUsize>,
}

impl RecordSource for CountedSource {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(entity_id).await
    }
}

struct Fixture {
    tmp: TempDir,
    calls: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("remote")).expect("remote dir");
        fs::create_dir_all(tmp.path().join("local")).expect("local dir");
        Self {
            tmp,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn out(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    fn remote(&self, id: &str, record: Value) {
        fs::write(
            self.tmp.path().join("remote").join(format!("{id}.json")),
            record.to_string(),
        )
        .expect("write remote record");
    }

    fn local(&self, file: &str, doc: Value) -> PathBuf {
        let path = self.tmp.path().join("local").join(file);
        fs::write(&path, doc.to_string()).expect("write local doc");
        path
    }

    fn ingestor(&self, delimiter: char, on_error: ErrorPolicy) -> Ingestor<CountedSource, ApiTranslator> {
        let source = CountedSource {
            inner: DirectorySource::new(self.tmp.path().join("remote")),
            calls: Arc::clone(&self.calls),
        };
        Ingestor::new(
            EntityCache::new(source, None),
            Reconciler::from_config(&Default::default()),
            SnapshotWriter::new(self.out(), ApiTranslator::identity()),
            IngestOptions {
                delimiter,
                on_error,
                show_diff: false,
            },
        )
    }

    fn snapshot_files(&self) -> Vec<String> {
        let Ok(dir) = fs::read_dir(self.out()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = dir
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

async fn run(
    ingestor: &mut Ingestor<CountedSource, ApiTranslator>,
    input: &str,
) -> (RunReport, String) {
    run_bytes(ingestor, input.as_bytes()).await
}

async fn run_bytes(
    ingestor: &mut Ingestor<CountedSource, ApiTranslator>,
    input: &[u8],
) -> (RunReport, String) {
    let mut progress = Vec::new();
    let report = ingestor.run(BufReader::new(input), &mut progress).await;
    (report, String::from_utf8(progress).expect("utf-8 progress"))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read snapshot")).expect("json snapshot")
}

fn smith() -> Value {
    json!({"name": {"surname": "Smith"}, "services": {"services": []}, "id": 42})
}

fn local_smith() -> Value {
    json!({"name": {"surname": "Smith"}, "service": {"services": []}})
}

#[tokio::test]
async fn unchanged_local_data_is_a_persisted_no_op() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor('|', ErrorPolicy::Skip);
    let (report, progress) = run(
        &mut ingestor,
        &format!("42|2024-01-01T00:00:00Z|{}\n", a.display()),
    )
    .await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.exit_code(), exit_code::OK);
    assert!(progress.contains("Updated (NOP)"), "{progress}");
    assert_eq!(report.unchanged, 1);
    assert_eq!(fx.snapshot_files(), vec!["42_2024-01-01T00:00:00Z.json"]);
    assert_eq!(
        read_json(&fx.out().join("42_2024-01-01T00:00:00Z.json")),
        smith()
    );
}

#[tokio::test]
async fn changed_name_is_updated_and_cached() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());
    let b = fx.local(
        "b.json",
        json!({"name": {"surname": "Jones"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input = format!("42:s1:{}\n42:s2:{}\n", a.display(), b.display());
    let (report, progress) = run(&mut ingestor, &input).await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.updated, 1);
    assert!(progress.contains("  Retrieved 42 from previous sight"), "{progress}");
    assert!(progress.lines().any(|l| l == "  Updated"), "{progress}");
    assert_eq!(fx.snapshot_files(), vec!["42_s1.json", "42_s2.json"]);

    let second = read_json(&fx.out().join("42_s2.json"));
    assert_eq!(second["name"], json!({"surname": "Jones"}));
    assert_eq!(second["id"], json!(42));
    let cached = ingestor.cache().peek(&EntityId::from("42")).expect("cached");
    assert_eq!(cached.clone().into_value(), second);
}

#[tokio::test]
async fn one_remote_fetch_per_entity() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    fx.remote("43", json!({"name": {}, "services": {"services": []}}));
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input: String = (0..5)
        .flat_map(|n| {
            [
                format!("42:s{n}:{}\n", a.display()),
                format!("43:s{n}:{}\n", a.display()),
            ]
        })
        .collect();
    let (report, _) = run(&mut ingestor, &input).await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.cache.fetches, 2);
    assert_eq!(report.cache.hits, 8);
    assert_eq!(report.snapshots.len(), 10);
}

#[tokio::test]
async fn rerunning_the_same_changes_is_idempotent() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let b = fx.local(
        "b.json",
        json!({"name": {"surname": "Jones", "birth_date": "05/06/1901"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input = format!("42:s1:{0}\n42:s2:{0}\n", b.display());
    let (report, progress) = run(&mut ingestor, &input).await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert!(progress.contains("Updated (NOP)"), "{progress}");
    assert_eq!(
        fs::read(fx.out().join("42_s1.json")).unwrap(),
        fs::read(fx.out().join("42_s2.json")).unwrap()
    );
    assert_eq!(
        read_json(&fx.out().join("42_s2.json"))["name"]["birth_date"],
        json!("1901-06-05")
    );
}

#[tokio::test]
async fn malformed_line_stops_before_any_write() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input = format!("7:s1\n42:s1:{}\n", a.display());
    let (report, progress) = run(&mut ingestor, &input).await;

    assert!(matches!(
        report.termination,
        Termination::MalformedInput { line: 1, .. }
    ));
    assert_eq!(report.exit_code(), exit_code::MALFORMED_INPUT);
    assert!(progress.is_empty(), "{progress}");
    assert!(fx.snapshot_files().is_empty());
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn collision_is_fatal_and_leaves_state_alone() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());
    let b = fx.local(
        "b.json",
        json!({"name": {"surname": "Jones"}, "service": {"services": []}}),
    );
    let c = fx.local(
        "c.json",
        json!({"name": {"surname": "Brown"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor('|', ErrorPolicy::Skip);
    let input = format!(
        "42|2024-01-01T00:00:00Z|{}\n42|2024-01-01T00:00:00Z|{}\n42|s3|{}\n",
        a.display(),
        b.display(),
        c.display()
    );
    let (report, _) = run(&mut ingestor, &input).await;

    assert!(matches!(
        report.termination,
        Termination::SnapshotCollision { line: 2, .. }
    ));
    assert_eq!(report.exit_code(), exit_code::SNAPSHOT_COLLISION);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, ErrorKind::SnapshotCollision);
    assert_eq!(fx.snapshot_files(), vec!["42_2024-01-01T00:00:00Z.json"]);
    assert_eq!(
        read_json(&fx.out().join("42_2024-01-01T00:00:00Z.json"))["name"],
        json!({"surname": "Smith"})
    );
    let cached = ingestor.cache().peek(&EntityId::from("42")).expect("cached");
    assert_eq!(cached.get("name"), Some(&json!({"surname": "Smith"})));
}

#[tokio::test]
async fn skip_policy_continues_past_failed_requests() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());
    let bad = fx.local(
        "bad.json",
        json!({"name": {"birth_date": "sometime"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input = format!(
        "99:s1:{a}\n42:s1:{missing}\n42:s2:{bad}\n42:s3:{a}\n",
        a = a.display(),
        missing = fx.tmp.path().join("local/missing.json").display(),
        bad = bad.display(),
    );
    let (report, progress) = run(&mut ingestor, &input).await;

    assert_eq!(
        report.termination,
        Termination::CompletedWithFailures { failed: 3 }
    );
    assert_eq!(report.exit_code(), exit_code::COMPLETED_WITH_FAILURES);
    let kinds: Vec<ErrorKind> = report.failures.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![ErrorKind::RemoteFetch, ErrorKind::LocalFile, ErrorKind::Normalization]
    );
    assert_eq!(report.failures[0].request.to_line(':'), format!("99:s1:{}", a.display()));
    assert!(progress.contains("Failed (normalization)"), "{progress}");
    assert_eq!(fx.snapshot_files(), vec!["42_s3.json"]);
}

#[tokio::test]
async fn halt_policy_stops_at_first_failure() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Halt);
    let input = format!("99:s1:{0}\n42:s1:{0}\n", a.display());
    let (report, _) = run(&mut ingestor, &input).await;

    assert_eq!(
        report.termination,
        Termination::Halted {
            line: 1,
            kind: ErrorKind::RemoteFetch
        }
    );
    assert_eq!(report.exit_code(), exit_code::REQUEST_FAILED);
    assert!(fx.snapshot_files().is_empty());
}

#[tokio::test]
async fn show_diff_prints_changed_fields() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let b = fx.local(
        "b.json",
        json!({"name": {"surname": "Jones"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip).with_show_diff(true);
    let (report, progress) = run(&mut ingestor, &format!("42:s1:{}\n", b.display())).await;

    assert_eq!(report.termination, Termination::Completed);
    assert!(progress.contains("--- a/42"), "{progress}");
    assert!(progress.contains("+++ b/42_s1"), "{progress}");
    assert!(
        progress
            .lines()
            .any(|l| l.starts_with('+') && l.contains("Jones")),
        "{progress}"
    );
}

#[tokio::test]
async fn returned_copies_do_not_alias_the_cache() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    run(&mut ingestor, &format!("42:s1:{}\n", a.display())).await;

    let mut copy = ingestor
        .cache()
        .peek(&EntityId::from("42"))
        .cloned()
        .expect("cached");
    copy.insert("name", json!({"surname": "Mutated"}));

    let stored = ingestor.cache().peek(&EntityId::from("42")).expect("cached");
    assert_eq!(stored.get("name"), Some(&json!({"surname": "Smith"})));
}

#[tokio::test]
async fn unreadable_input_stops_after_the_lines_already_handled() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let mut input = format!("42:s1:{}\n", a.display()).into_bytes();
    input.extend_from_slice(b"42:s\xff2:/x\n");
    let (report, _) = run_bytes(&mut ingestor, &input).await;

    assert!(
        matches!(report.termination, Termination::InputUnreadable { line: 2, .. }),
        "{:?}",
        report.termination
    );
    assert_eq!(report.exit_code(), exit_code::INPUT_UNREADABLE);
    assert_eq!(report.exit_code(), 6);
    assert_eq!(fx.snapshot_files(), vec!["42_s1.json"]);
}

#[tokio::test]
async fn receipts_carry_the_digest_of_the_written_state() {
    let fx = Fixture::new();
    fx.remote("42", smith());
    let a = fx.local("a.json", local_smith());
    let b = fx.local(
        "b.json",
        json!({"name": {"surname": "Jones"}, "service": {"services": []}}),
    );

    let mut ingestor = fx.ingestor(':', ErrorPolicy::Skip);
    let input = format!("42:s1:{}\n42:s2:{}\n", a.display(), b.display());
    let (report, progress) = run(&mut ingestor, &input).await;

    assert_eq!(report.snapshots.len(), 2);
    for receipt in &report.snapshots {
        let on_disk = Record::try_from(read_json(&receipt.path)).expect("object snapshot");
        assert_eq!(receipt.digest, on_disk.digest());
        assert!(
            progress.contains(&format!("(sha256 {})", receipt.short_digest())),
            "{progress}"
        );
    }
    assert_ne!(report.snapshots[0].digest, report.snapshots[1].digest);
}
