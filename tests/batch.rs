//! Batch controller integration tests.
//!
//! The content service is replaced by an in-memory fake that records which
//! albums were looked up and fetched, writes junk into the scratch directory
//! the way a real download would, and fails on demand.

use album2pdf::{
    event_channel, AlbumDetail, AlbumSource, Album2PdfError, AlwaysOverwrite, BatchController,
    BatchEvent, BatchSummary, DownloaderConfig, ItemError, ItemStatus, NeverOverwrite,
    OverwritePrompt, RecordStore,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_stream::StreamExt;

// ── Test doubles ─────────────────────────────────────────────────────────────

struct FakeSource {
    titles: HashMap<String, String>,
    failing_fetch: HashSet<String>,
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    looked_up: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new(config: &DownloaderConfig, titles: &[(&str, &str)]) -> Self {
        Self {
            titles: titles
                .iter()
                .map(|(id, t)| (id.to_string(), t.to_string()))
                .collect(),
            failing_fetch: HashSet::new(),
            output_dir: config.output_dir.clone(),
            scratch_dir: config.scratch_dir(),
            looked_up: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing_fetch.insert(id.to_string());
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlbumSource for FakeSource {
    async fn lookup_detail(&self, id: &str) -> Result<AlbumDetail, Album2PdfError> {
        self.looked_up.lock().unwrap().push(id.to_string());
        match self.titles.get(id) {
            Some(title) => Ok(AlbumDetail {
                id: id.to_string(),
                title: title.clone(),
                images: vec![],
            }),
            None => Err(Album2PdfError::LookupFailed {
                id: id.to_string(),
                reason: "HTTP 404 Not Found".into(),
            }),
        }
    }

    async fn fetch_and_assemble(&self, detail: &AlbumDetail) -> Result<PathBuf, Album2PdfError> {
        self.fetched.lock().unwrap().push(detail.id.clone());

        let album_dir = self.scratch_dir.join(&detail.id);
        let _ = std::fs::create_dir_all(&album_dir);
        let _ = std::fs::write(album_dir.join("0001.jpg"), b"partial");

        if self.failing_fetch.contains(&detail.id) {
            return Err(Album2PdfError::DownloadFailed {
                url: format!("https://cdn.example.com/{}/0001.jpg", detail.id),
                reason: "network unreachable".into(),
            });
        }

        let artifact = self.output_dir.join(format!("{}.pdf", detail.title));
        std::fs::write(&artifact, b"%PDF-1.7").unwrap();
        Ok(artifact)
    }
}

/// Answers from a fixed table; unknown ids get `default`.
struct ScriptedPrompt {
    answers: HashMap<String, bool>,
    default: bool,
    asked: Mutex<Vec<(String, String)>>,
}

impl ScriptedPrompt {
    fn new(default: bool, answers: &[(&str, bool)]) -> Self {
        Self {
            answers: answers.iter().map(|(id, a)| (id.to_string(), *a)).collect(),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OverwritePrompt for ScriptedPrompt {
    async fn confirm_overwrite(&self, id: &str, existing_title: &str) -> bool {
        self.asked
            .lock()
            .unwrap()
            .push((id.to_string(), existing_title.to_string()));
        self.answers.get(id).copied().unwrap_or(self.default)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `RUST_LOG=album2pdf=debug cargo test` shows the library's logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_in(dir: &TempDir) -> DownloaderConfig {
    DownloaderConfig::builder()
        .output_dir(dir.path())
        .cleanup_backoff_ms(0)
        .build()
        .expect("valid config")
}

fn controller(
    config: &DownloaderConfig,
    records: &Arc<RecordStore>,
    source: &Arc<FakeSource>,
    prompt: Arc<dyn OverwritePrompt>,
) -> BatchController {
    BatchController::new(
        config.clone(),
        Arc::clone(records),
        Arc::clone(source) as Arc<dyn AlbumSource>,
        prompt,
    )
}

async fn run(
    controller: &BatchController,
    raw: &str,
) -> (Result<BatchSummary, Album2PdfError>, Vec<BatchEvent>) {
    init_tracing();
    let (events, mut rx) = event_channel(256);
    let result = controller.run_batch(raw, &events).await;
    drop(events);

    let mut log = Vec::new();
    while let Some(event) = rx.recv().await {
        log.push(event);
    }
    (result, log)
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(false)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_ids_are_processed_once() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha"), ("B", "Beta")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, "A\nA\nB").await;
    let summary = result.unwrap();

    assert_eq!(summary.total, 2);
    assert!(log.contains(&BatchEvent::Started { total: 2 }));
    let fetched: HashSet<String> = source.fetched().into_iter().collect();
    assert_eq!(fetched, HashSet::from(["A".to_string(), "B".to_string()]));
    assert_eq!(source.fetched().len(), 2);
}

#[tokio::test]
async fn declined_duplicate_is_skipped_without_fetch() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    records.add_record("A", "Foo").unwrap();

    let source = Arc::new(FakeSource::new(&config, &[("A", "Foo (new)")]));
    let prompt = Arc::new(ScriptedPrompt::new(false, &[]));
    let ctl = controller(&config, &records, &source, prompt.clone());

    let (result, log) = run(&ctl, "A").await;
    let summary = result.unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(log.contains(&BatchEvent::DuplicateSkipped {
        id: "A".into(),
        title: "Foo".into(),
    }));
    assert!(source.fetched().is_empty());
    assert!(source.looked_up.lock().unwrap().is_empty());
    assert_eq!(
        *prompt.asked.lock().unwrap(),
        vec![("A".to_string(), "Foo".to_string())]
    );
    assert_eq!(records.get_title("A"), "Foo");
}

#[tokio::test]
async fn confirmed_duplicate_is_downloaded_again() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    records.add_record("A", "Foo").unwrap();

    let source = Arc::new(FakeSource::new(&config, &[("A", "Foo Remastered")]));
    let ctl = controller(&config, &records, &source, Arc::new(AlwaysOverwrite));

    let (result, _) = run(&ctl, "A").await;
    assert_eq!(result.unwrap().succeeded, 1);
    assert_eq!(source.fetched(), vec!["A"]);
    assert_eq!(records.get_title("A"), "Foo Remastered");
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn fetched_set_is_input_minus_declined() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    records.add_record("A", "Old A").unwrap();
    records.add_record("B", "Old B").unwrap();

    let source = Arc::new(FakeSource::new(
        &config,
        &[("A", "A"), ("B", "B"), ("C", "C")],
    ));
    let prompt = Arc::new(ScriptedPrompt::new(true, &[("A", false)]));
    let ctl = controller(&config, &records, &source, prompt);

    let (result, _) = run(&ctl, "A B C A\n\nC").await;
    let summary = result.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!((summary.skipped, summary.succeeded, summary.failed), (1, 2, 0));
    assert_eq!(source.fetched(), vec!["B", "C"]);
}

#[tokio::test]
async fn fetch_failure_does_not_stop_later_albums() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("C", "Bar"), ("D", "Baz")]).failing("C"));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, "C D").await;
    let summary = result.unwrap();

    assert_eq!(summary.failed_ids(), vec!["C"]);
    assert_eq!(summary.succeeded, 1);
    assert!(log.contains(&BatchEvent::TitleResolved {
        id: "C".into(),
        title: "Bar".into(),
    }));
    let failure = log
        .iter()
        .find_map(|e| match e {
            BatchEvent::ItemFailed { error } => Some(error.clone()),
            _ => None,
        })
        .expect("failure event");
    assert!(matches!(failure, ItemError::FetchFailed { ref id, .. } if id == "C"));
    assert!(failure.to_string().contains("network unreachable"));

    assert!(!records.is_downloaded("C"));
    assert!(records.is_downloaded("D"));
    assert_eq!(source.fetched(), vec!["C", "D"]);
}

#[tokio::test]
async fn lookup_failure_is_isolated() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("ok", "Fine")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, _) = run(&ctl, "missing ok").await;
    let summary = result.unwrap();

    match &summary.outcomes[0].status {
        ItemStatus::Failed {
            error: ItemError::LookupFailed { id, detail },
        } => {
            assert_eq!(id, "missing");
            assert!(detail.contains("404"));
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(source.fetched(), vec!["ok"]);
    assert!(!records.is_downloaded("missing"));
}

#[tokio::test]
async fn empty_input_reports_and_ends() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, " \n\t ").await;

    assert!(matches!(result, Err(Album2PdfError::EmptyInput)));
    assert_eq!(log, vec![BatchEvent::NoInput]);
    assert!(source.looked_up.lock().unwrap().is_empty());
}

#[tokio::test]
async fn progress_is_monotonic_and_bounded() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    records.add_record("2", "Two").unwrap();
    let source = Arc::new(FakeSource::new(&config, &[("1", "One"), ("3", "Three")]).failing("3"));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (_, log) = run(&ctl, "1 2 3 4").await;

    let progress: Vec<(usize, usize)> = log
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { value, max } => Some((*value, *max)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(0, 4), (1, 4), (2, 4), (3, 4), (4, 4)]);
    assert!(matches!(log.last(), Some(BatchEvent::Finished(_))));
}

#[tokio::test]
async fn scratch_is_wiped_after_success_and_at_end() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]).failing("B"));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, "A B").await;
    result.unwrap();

    let cleanups = log
        .iter()
        .filter(|e| matches!(e, BatchEvent::ScratchCleaned { .. }))
        .count();
    // one after A, none after the failed B, one at batch end
    assert_eq!(cleanups, 2);
    assert!(config.scratch_dir().is_dir());
    assert!(dir_is_empty(&config.scratch_dir()));
}

#[tokio::test]
async fn cleanup_failure_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();

    let config = DownloaderConfig::builder()
        .output_dir(dir.path())
        .scratch_dir(blocker.join("temp_images"))
        .cleanup_attempts(2)
        .cleanup_backoff_ms(0)
        .build()
        .unwrap();
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, "A").await;
    let summary = result.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(records.is_downloaded("A"));
    let failures = log
        .iter()
        .filter(|e| matches!(e, BatchEvent::ScratchCleanupFailed { attempts: 2, .. }))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn unsaved_record_is_reported_but_kept_in_memory() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();

    let config = DownloaderConfig::builder()
        .output_dir(dir.path())
        .record_file(blocker.join("records.json"))
        .cleanup_backoff_ms(0)
        .build()
        .unwrap();
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, log) = run(&ctl, "A").await;

    assert_eq!(result.unwrap().succeeded, 1);
    assert!(log
        .iter()
        .any(|e| matches!(e, BatchEvent::RecordNotSaved { id, .. } if id == "A")));
    assert!(records.is_downloaded("A"));
}

#[tokio::test]
async fn records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    {
        let records = Arc::new(RecordStore::open(config.record_file()));
        let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]));
        let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));
        run(&ctl, "A").await.0.unwrap();
    }

    let reopened = RecordStore::open(config.record_file());
    assert!(reopened.is_downloaded("A"));
    assert_eq!(reopened.get_title("A"), "Alpha");

    // The second run sees the record and skips without fetching.
    let records = Arc::new(reopened);
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));
    let (result, _) = run(&ctl, "A").await;
    assert_eq!(result.unwrap().skipped, 1);
    assert!(source.fetched().is_empty());
}

#[tokio::test]
async fn scratch_over_output_is_refused_and_outputs_survive_resets() {
    let dir = TempDir::new().unwrap();

    let err = DownloaderConfig::builder()
        .output_dir(dir.path())
        .scratch_dir(dir.path())
        .build()
        .unwrap_err();
    assert!(matches!(err, Album2PdfError::InvalidConfig(_)));

    // With the default layout, the per-item and final resets leave the
    // finished PDF and the record file alone.
    let config = config_in(&dir);
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha")]));
    let ctl = controller(&config, &records, &source, Arc::new(NeverOverwrite));

    let (result, _) = run(&ctl, "A").await;
    assert_eq!(result.unwrap().succeeded, 1);
    assert!(config.output_dir.join("Alpha.pdf").is_file());
    assert!(config.record_file().is_file());
    assert!(RecordStore::open(config.record_file()).is_downloaded("A"));
}

#[tokio::test]
async fn spawned_batch_streams_events_in_order() {
    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig::builder()
        .output_dir(dir.path())
        .cleanup_backoff_ms(0)
        .event_buffer(1)
        .build()
        .unwrap();
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha"), ("B", "Beta")]));
    let ctl = Arc::new(controller(&config, &records, &source, Arc::new(NeverOverwrite)));

    let mut batch = ctl.spawn("A B");
    let mut log = Vec::new();
    while let Some(event) = batch.events().next().await {
        log.push(event);
    }
    let summary = batch.wait().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(log.first(), Some(&BatchEvent::Started { total: 2 }));
    assert_eq!(log.last(), Some(&BatchEvent::Finished(summary)));

    let succeeded: Vec<&str> = log
        .iter()
        .filter_map(|e| match e {
            BatchEvent::ItemSucceeded { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(succeeded, vec!["A", "B"]);
}

#[tokio::test]
async fn dropped_receiver_does_not_stall_batch() {
    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig::builder()
        .output_dir(dir.path())
        .cleanup_backoff_ms(0)
        .event_buffer(1)
        .build()
        .unwrap();
    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(FakeSource::new(&config, &[("A", "Alpha"), ("B", "Beta")]));
    let ctl = Arc::new(controller(&config, &records, &source, Arc::new(NeverOverwrite)));

    let summary = ctl.spawn("A B").wait().await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert!(records.is_downloaded("A") && records.is_downloaded("B"));
}
