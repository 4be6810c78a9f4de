//! End-to-end tests for the upload session state machine, driven by a
//! scripted backend and paused virtual time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lectern::api::ApiError;
use lectern::cache::{Invalidate, QueryScope};
use lectern::notify::{Notification, Notify};
use lectern::upload::{
    FilePayload, MaterialUpload, PollOutcome, UploadBackend, UploadError, UploadMeta,
    UploadProgress, UploadRequest, UploadSession, UploadStage, Uploader, VideoUpload,
};

/// One scripted poll response
enum Scripted {
    Ok(UploadProgress),
    /// Resolves only after the given virtual-time delay
    OkAfter(Duration, UploadProgress),
    NetworkErr(&'static str),
}

struct ScriptedBackend {
    start_script: Mutex<VecDeque<Result<UploadSession, ApiError>>>,
    poll_script: Mutex<VecDeque<Scripted>>,
    start_count: AtomicUsize,
    poll_count: AtomicUsize,
    poll_instants: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedBackend {
    fn new(poll_script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            start_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(poll_script.into()),
            start_count: AtomicUsize::new(0),
            poll_count: AtomicUsize::new(0),
            poll_instants: Mutex::new(Vec::new()),
        })
    }

    fn with_start_script(
        poll_script: Vec<Scripted>,
        start_script: Vec<Result<UploadSession, ApiError>>,
    ) -> Arc<Self> {
        let backend = Self::new(poll_script);
        *backend.start_script.lock().expect("lock") = start_script.into();
        backend
    }

    fn starts(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    fn poll_instants(&self) -> Vec<tokio::time::Instant> {
        self.poll_instants.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UploadBackend for ScriptedBackend {
    async fn start(&self, _request: &UploadRequest) -> Result<UploadSession, ApiError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.start_script
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(session("sess-123")))
    }

    async fn poll(&self, _session: &UploadSession) -> Result<UploadProgress, ApiError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.poll_instants
            .lock()
            .expect("lock")
            .push(tokio::time::Instant::now());

        let next = self.poll_script.lock().expect("lock").pop_front();
        match next {
            Some(Scripted::Ok(progress)) => Ok(progress),
            Some(Scripted::OkAfter(delay, progress)) => {
                tokio::time::sleep(delay).await;
                Ok(progress)
            }
            Some(Scripted::NetworkErr(message)) => Err(ApiError::Network(message.to_string())),
            None => Err(ApiError::Network("script exhausted".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("lock").clone()
    }
}

impl Notify for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.events.lock().expect("lock").push(notification);
    }
}

#[derive(Default)]
struct RecordingInvalidator {
    calls: Mutex<Vec<Vec<QueryScope>>>,
}

impl RecordingInvalidator {
    fn calls(&self) -> Vec<Vec<QueryScope>> {
        self.calls.lock().expect("lock").clone()
    }
}

impl Invalidate for RecordingInvalidator {
    fn invalidate(&self, scopes: &[QueryScope]) {
        self.calls.lock().expect("lock").push(scopes.to_vec());
    }
}

fn session(id: &str) -> UploadSession {
    UploadSession {
        session_id: id.to_string(),
        progress_endpoint: None,
        started_at: chrono::Utc::now(),
    }
}

fn payload(name: &str) -> FilePayload {
    FilePayload {
        path: format!("/tmp/{name}").into(),
        file_name: name.to_string(),
        size_bytes: 1024,
        sha256: "ab".repeat(32),
    }
}

fn meta() -> UploadMeta {
    UploadMeta {
        topic_id: "t1".to_string(),
        subject_id: "s1".to_string(),
        title: "Lecture 1".to_string(),
        description: None,
    }
}

fn video_request() -> UploadRequest {
    UploadRequest::Video(VideoUpload {
        meta: meta(),
        video: payload("lecture.mp4"),
        thumbnail: None,
    })
}

fn material_request() -> UploadRequest {
    UploadRequest::Material(MaterialUpload {
        meta: meta(),
        material: payload("worksheet.pdf"),
    })
}

fn snapshot(stage: UploadStage, progress: f64) -> UploadProgress {
    UploadProgress {
        stage,
        progress,
        bytes_uploaded: 0,
        total_bytes: 0,
        estimated_time_remaining: None,
        error: None,
        material_id: None,
    }
}

fn completed(material_id: &str) -> UploadProgress {
    UploadProgress {
        material_id: Some(material_id.to_string()),
        ..snapshot(UploadStage::Completed, 100.0)
    }
}

fn errored(message: &str) -> UploadProgress {
    UploadProgress {
        error: Some(message.to_string()),
        ..snapshot(UploadStage::Error, 0.0)
    }
}

struct Harness {
    backend: Arc<ScriptedBackend>,
    notifier: Arc<RecordingNotifier>,
    invalidator: Arc<RecordingInvalidator>,
    uploader: Uploader,
}

fn harness(backend: Arc<ScriptedBackend>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let invalidator = Arc::new(RecordingInvalidator::default());
    let uploader = Uploader::new(backend.clone(), invalidator.clone(), notifier.clone());
    Harness {
        backend,
        notifier,
        invalidator,
        uploader,
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_completes_after_three_polls() -> Result<(), UploadError> {
    let h = harness(ScriptedBackend::new(vec![
        Scripted::Ok(snapshot(UploadStage::Uploading, 10.0)),
        Scripted::Ok(snapshot(UploadStage::Processing, 60.0)),
        Scripted::Ok(completed("m-1")),
        // Must never be consumed: the session is terminal after poll 3
        Scripted::Ok(snapshot(UploadStage::Uploading, 99.0)),
        Scripted::Ok(snapshot(UploadStage::Uploading, 99.0)),
    ]));

    let handle = h.uploader.begin(video_request()).await?;
    assert_eq!(handle.session().session_id, "sess-123");

    let outcome = handle.wait().await?;
    match outcome {
        PollOutcome::Terminal(progress) => {
            assert_eq!(progress.stage, UploadStage::Completed);
            assert_eq!(progress.material_id.as_deref(), Some("m-1"));
        }
        other => panic!("expected terminal outcome, got {other:?}"),
    }

    assert_eq!(h.backend.starts(), 1);
    assert_eq!(h.backend.polls(), 3);

    // The timer is gone: no further polls however long we wait
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(h.backend.polls(), 3);

    assert_eq!(
        h.notifier.events(),
        vec![Notification::UploadCompleted {
            title: "Lecture 1".to_string(),
            material_id: Some("m-1".to_string()),
        }]
    );

    let calls = h.invalidator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        vec![
            QueryScope::TopicMaterials,
            QueryScope::ChapterContents,
            QueryScope::ClassResources,
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn server_error_stops_after_one_poll() -> Result<(), UploadError> {
    let h = harness(ScriptedBackend::new(vec![Scripted::Ok(errored(
        "File too large",
    ))]));

    let handle = h.uploader.begin(material_request()).await?;
    let outcome = handle.wait().await?;

    match outcome {
        PollOutcome::Terminal(progress) => {
            assert_eq!(progress.stage, UploadStage::Error);
            assert_eq!(progress.error.as_deref(), Some("File too large"));
        }
        other => panic!("expected terminal outcome, got {other:?}"),
    }

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(h.backend.polls(), 1);

    assert_eq!(
        h.notifier.events(),
        vec![Notification::UploadFailed {
            title: "Lecture 1".to_string(),
            message: "File too large".to_string(),
        }]
    );
    assert!(h.invalidator.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn validation_rejects_before_any_network_traffic() {
    let h = harness(ScriptedBackend::new(vec![]));

    let request = UploadRequest::Material(MaterialUpload {
        meta: UploadMeta {
            topic_id: String::new(),
            ..meta()
        },
        material: payload("worksheet.pdf"),
    });

    let result = h.uploader.begin(request).await;
    assert!(matches!(result, Err(UploadError::InvalidRequest(_))));
    assert_eq!(h.backend.starts(), 0);
    assert_eq!(h.backend.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn polls_run_on_a_two_second_cadence() -> Result<(), UploadError> {
    let h = harness(ScriptedBackend::new(vec![
        Scripted::Ok(snapshot(UploadStage::Validating, 0.0)),
        Scripted::Ok(snapshot(UploadStage::Uploading, 20.0)),
        Scripted::Ok(snapshot(UploadStage::Saving, 90.0)),
        Scripted::Ok(completed("m-2")),
    ]));

    let handle = h.uploader.begin(material_request()).await?;
    let _ = handle.wait().await?;

    let instants = h.backend.poll_instants();
    assert_eq!(instants.len(), 4);
    for pair in instants.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_millis(2000));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reset_stops_polling_at_any_stage() -> Result<(), UploadError> {
    let script: Vec<Scripted> = (0..10)
        .map(|_| Scripted::Ok(snapshot(UploadStage::Uploading, 10.0)))
        .collect();
    let h = harness(ScriptedBackend::new(script));

    let handle = h.uploader.begin(material_request()).await?;
    let mut updates = handle.progress();

    // Wait for the first snapshot to land, then tear the session down
    updates
        .changed()
        .await
        .expect("poll loop ended before first snapshot");
    handle.reset();

    let polls_at_reset = h.backend.polls();
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.backend.polls(), polls_at_reset);

    let outcome = handle.wait().await?;
    assert!(matches!(outcome, PollOutcome::Cancelled));
    assert!(h.notifier.events().is_empty());
    assert!(h.invalidator.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn consecutive_poll_failures_abort_the_session() -> Result<(), UploadError> {
    let script: Vec<Scripted> = (0..10)
        .map(|_| Scripted::NetworkErr("connection refused"))
        .collect();
    let h = harness(ScriptedBackend::new(script));

    let handle = h.uploader.begin(material_request()).await?;
    let updates = handle.progress();
    let outcome = handle.wait().await?;

    match outcome {
        PollOutcome::Aborted(e) => assert!(e.to_string().contains("connection refused")),
        other => panic!("expected aborted outcome, got {other:?}"),
    }
    // The failure budget, not the script length, decides when to stop
    assert_eq!(h.backend.polls(), 5);

    let last = updates.borrow().clone().expect("no snapshot published");
    assert_eq!(last.stage, UploadStage::Error);
    assert!(last
        .error
        .as_deref()
        .is_some_and(|e| e.contains("abandoned after 5")));

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Notification::UploadFailed { message, .. } if message.contains("connection refused")
    ));
    assert!(h.invalidator.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn single_poll_failure_does_not_stop_the_loop() -> Result<(), UploadError> {
    let h = harness(ScriptedBackend::new(vec![
        Scripted::Ok(snapshot(UploadStage::Uploading, 10.0)),
        Scripted::NetworkErr("connection reset"),
        Scripted::Ok(snapshot(UploadStage::Processing, 70.0)),
        Scripted::Ok(completed("m-3")),
    ]));

    let handle = h.uploader.begin(material_request()).await?;
    let outcome = handle.wait().await?;

    match outcome {
        PollOutcome::Terminal(progress) => {
            assert_eq!(progress.stage, UploadStage::Completed);
        }
        other => panic!("expected terminal outcome, got {other:?}"),
    }
    assert_eq!(h.backend.polls(), 4);
    assert_eq!(h.invalidator.calls().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_response_never_overwrites_newer_state() -> Result<(), UploadError> {
    // Poll 1 resolves at t=3s, after poll 2 (issued t=2s) has already
    // been applied; its snapshot must be discarded.
    let h = harness(ScriptedBackend::new(vec![
        Scripted::OkAfter(
            Duration::from_millis(3000),
            snapshot(UploadStage::Validating, 5.0),
        ),
        Scripted::Ok(snapshot(UploadStage::Uploading, 50.0)),
        Scripted::Ok(completed("m-4")),
    ]));

    let handle = h.uploader.begin(material_request()).await?;
    let mut updates = handle.progress();
    let history = Arc::new(Mutex::new(Vec::new()));
    let sink = history.clone();
    let collector = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let latest = updates.borrow_and_update().clone();
            if let Some(progress) = latest {
                sink.lock().expect("lock").push((progress.stage, progress.progress));
            }
        }
    });

    let outcome = handle.wait().await?;
    collector.await.expect("collector panicked");

    assert!(matches!(outcome, PollOutcome::Terminal(_)));
    let observed = history.lock().expect("lock").clone();
    assert_eq!(
        observed,
        vec![
            (UploadStage::Uploading, 50.0),
            (UploadStage::Completed, 100.0),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_start_failures_are_retried() -> Result<(), UploadError> {
    let h = harness(ScriptedBackend::with_start_script(
        vec![Scripted::Ok(completed("m-5"))],
        vec![
            Err(ApiError::Network("timed out".to_string())),
            Err(ApiError::Network("timed out".to_string())),
            Ok(session("sess-456")),
        ],
    ));

    let handle = h.uploader.begin(material_request()).await?;
    assert_eq!(handle.session().session_id, "sess-456");
    assert_eq!(h.backend.starts(), 3);

    let _ = handle.wait().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_start_is_not_retried_and_creates_no_session() {
    let h = harness(ScriptedBackend::with_start_script(
        vec![],
        vec![Err(ApiError::Api("400 - topic not found".to_string()))],
    ));

    let result = h.uploader.begin(material_request()).await;
    assert!(matches!(result, Err(UploadError::StartFailed(_))));
    assert_eq!(h.backend.starts(), 1);
    assert_eq!(h.backend.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_polling() -> Result<(), UploadError> {
    let script: Vec<Scripted> = (0..10)
        .map(|_| Scripted::Ok(snapshot(UploadStage::Uploading, 10.0)))
        .collect();
    let h = harness(ScriptedBackend::new(script));

    let handle = h.uploader.begin(material_request()).await?;
    let mut updates = handle.progress();
    updates
        .changed()
        .await
        .expect("poll loop ended before first snapshot");
    drop(handle);

    let polls_at_drop = h.backend.polls();
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.backend.polls(), polls_at_drop);
    Ok(())
}
