//! Live capture session — the periodic grab-and-submit loop.
//!
//! A [`LiveCapture`] owns its camera source, its tick task, and its
//! in-flight submission budget for the lifetime of one streaming session.
//! Matches, info messages, and errors reach the caller over an event
//! channel; nothing about rendering leaks in here.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use beacon_camera::FrameSource;
use beacon_client::api::{FrameResponse, FrameSubmission};
use beacon_client::{ApiClient, ClientError, Locator};
use beacon_core::{DetectionEvent, GeoFix, Source};
use chrono::Utc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Cadence of the capture loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(750);

/// Duration of the visual acknowledgment emitted on a match.
pub const FLASH_DURATION: Duration = Duration::from_millis(350);

/// Budget for the best-effort location fetch at session start.
const LOCATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Default cap on concurrent in-flight frame submissions. A slow backend
/// delays when its result is applied; it never piles up requests.
pub const DEFAULT_INFLIGHT_LIMIT: usize = 4;

/// Events a live session emits to its subscriber.
#[derive(Debug)]
pub enum LiveEvent {
    /// A recognized face, already canonical with `source = live`.
    Match(DetectionEvent),
    Info(String),
    Error(String),
    /// Brief visual acknowledgment of a successful match.
    Flash(Duration),
}

pub type ProcessFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FrameResponse, ClientError>> + Send + 'a>>;

/// Collaborator that turns a submitted frame into a match decision.
pub trait FrameProcessor: Send + Sync + 'static {
    fn process(&self, submission: FrameSubmission) -> ProcessFuture<'_>;
}

impl FrameProcessor for ApiClient {
    fn process(&self, submission: FrameSubmission) -> ProcessFuture<'_> {
        Box::pin(async move { self.process_frame(&submission).await })
    }
}

/// Knobs for a live session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub tick: Duration,
    pub inflight_limit: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick: TICK_INTERVAL,
            inflight_limit: DEFAULT_INFLIGHT_LIMIT,
        }
    }
}

/// State shared with the loop task and in-flight submissions.
struct Shared {
    streaming: AtomicBool,
    /// Bumped on every `start()`; submissions stamped with an older value
    /// are stale and their results are discarded.
    generation: AtomicU64,
}

/// One live camera session: start, stream, stop.
pub struct LiveCapture<S: FrameSource> {
    cfg: LiveConfig,
    source: Arc<Mutex<S>>,
    processor: Arc<dyn FrameProcessor>,
    locator: Option<Arc<dyn Locator>>,
    events: mpsc::UnboundedSender<LiveEvent>,
    shared: Arc<Shared>,
    inflight: Arc<Semaphore>,
    cached_fix: Option<GeoFix>,
    task: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl<S: FrameSource> LiveCapture<S> {
    pub fn new(
        cfg: LiveConfig,
        source: S,
        processor: Arc<dyn FrameProcessor>,
        locator: Option<Arc<dyn Locator>>,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> Self {
        let inflight = Arc::new(Semaphore::new(cfg.inflight_limit));
        Self {
            cfg,
            source: Arc::new(Mutex::new(source)),
            processor,
            locator,
            events,
            shared: Arc::new(Shared {
                streaming: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            inflight,
            cached_fix: None,
            task: None,
            stop_tx: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Begin streaming. No-op when already streaming.
    ///
    /// Resolves the location provider first (bounded, best-effort), then
    /// opens the camera. Open failures are reported through the event
    /// channel as a human-readable [`LiveEvent::Error`]; this method never
    /// returns an error to the caller.
    pub async fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        if self.cached_fix.is_none() {
            if let Some(locator) = &self.locator {
                match tokio::time::timeout(LOCATION_TIMEOUT, locator.resolve()).await {
                    Ok(Ok(fix)) => {
                        tracing::debug!(lat = fix.lat, lon = fix.lon, "location resolved");
                        self.cached_fix = Some(fix);
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "location unavailable; submitting without coordinates");
                    }
                    Err(_) => {
                        tracing::debug!("location lookup timed out; submitting without coordinates");
                    }
                }
            }
        }

        if let Err(e) = lock_recover(&self.source).open() {
            tracing::warn!(error = %e, "camera acquisition failed");
            let _ = self
                .events
                .send(LiveEvent::Error(format!("Unable to access camera: {e}")));
            return;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.streaming.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(run_loop(
            self.cfg.tick,
            Arc::clone(&self.source),
            Arc::clone(&self.processor),
            self.events.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.inflight),
            self.cached_fix,
            generation,
            stop_rx,
        )));
        tracing::info!(tick_ms = self.cfg.tick.as_millis() as u64, "live capture started");
    }

    /// Stop streaming: no further ticks, camera released. Idempotent and
    /// safe to call before `start()`. In-flight submissions are not
    /// cancelled; their late results are discarded as stale.
    pub fn stop(&mut self) {
        self.shared.streaming.store(false, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if self.task.take().is_some() {
            tracing::info!("live capture stopped");
        }
        lock_recover(&self.source).close();
    }
}

impl<S: FrameSource> Drop for LiveCapture<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lock a mutex, recovering the guard if a panic poisoned it.
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<S: FrameSource>(
    tick: Duration,
    source: Arc<Mutex<S>>,
    processor: Arc<dyn FrameProcessor>,
    events: mpsc::UnboundedSender<LiveEvent>,
    shared: Arc<Shared>,
    inflight: Arc<Semaphore>,
    fix: Option<GeoFix>,
    generation: u64,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        // Stream not ready yet: skip the tick, not an error.
        let Some(frame) = lock_recover(&source).grab() else {
            tracing::trace!("no frame available; skipping tick");
            continue;
        };

        let now = Utc::now();
        let submission = FrameSubmission {
            frame: frame.data_uri,
            frame_number: now.timestamp_millis(),
            timestamp: now,
            lat: fix.map(|f| f.lat),
            lon: fix.map(|f| f.lon),
            accuracy: fix.and_then(|f| f.accuracy),
        };

        let Ok(permit) = Arc::clone(&inflight).try_acquire_owned() else {
            tracing::trace!("submission budget exhausted; skipping tick");
            continue;
        };

        tokio::spawn(submit_frame(
            Arc::clone(&processor),
            submission,
            events.clone(),
            Arc::clone(&shared),
            generation,
            permit,
        ));
    }

    tracing::debug!("capture loop exited");
}

/// One fire-and-forget frame submission.
///
/// Transient failures are logged and swallowed; the next tick retries
/// naturally. A matched response landing after `stop()` or a restart is
/// discarded as stale.
async fn submit_frame(
    processor: Arc<dyn FrameProcessor>,
    submission: FrameSubmission,
    events: mpsc::UnboundedSender<LiveEvent>,
    shared: Arc<Shared>,
    generation: u64,
    _permit: OwnedSemaphorePermit,
) {
    let frame_number = submission.frame_number;
    let captured_at = submission.timestamp;

    let response = match processor.process(submission).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, frame = frame_number, "frame submission failed; next tick retries");
            return;
        }
    };

    if !response.matched {
        return;
    }

    let current = shared.streaming.load(Ordering::SeqCst)
        && shared.generation.load(Ordering::SeqCst) == generation;
    if !current {
        tracing::debug!(frame = frame_number, "stale match response discarded");
        return;
    }

    let mut event = response
        .face_data
        .unwrap_or_default()
        .normalize(Some(Source::Live), captured_at);
    event.frame = event.frame.or(Some(frame_number));

    let _ = events.send(LiveEvent::Flash(FLASH_DURATION));
    let _ = events.send(LiveEvent::Info(format!(
        "Face captured! Match found for {}",
        event.name
    )));
    let _ = events.send(LiveEvent::Match(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_camera::{CameraError, EncodedFrame};
    use beacon_client::{LocateError, LocateFuture, StaticLocator};
    use beacon_core::RawDetection;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::error::TryRecvError;

    fn test_frame() -> EncodedFrame {
        EncodedFrame {
            data_uri: "data:image/jpeg;base64,Zg==".into(),
            width: 640,
            height: 480,
            sequence: 0,
        }
    }

    /// Scripted camera: plays back `frames`, then either dries up or keeps
    /// yielding stills when `endless` is set.
    struct ScriptedSource {
        frames: VecDeque<Option<EncodedFrame>>,
        endless: bool,
        fail_open: bool,
        released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Option<EncodedFrame>>) -> Self {
            Self {
                frames: frames.into(),
                endless: false,
                fail_open: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }

        fn endless() -> Self {
            let mut source = Self::new(Vec::new());
            source.endless = true;
            source
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<(), CameraError> {
            if self.fail_open {
                Err(CameraError::AccessDenied("/dev/video9".into()))
            } else {
                Ok(())
            }
        }

        fn grab(&mut self) -> Option<EncodedFrame> {
            match self.frames.pop_front() {
                Some(scripted) => scripted,
                None if self.endless => Some(test_frame()),
                None => None,
            }
        }

        fn close(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Copy)]
    enum Reply {
        Match(&'static str),
        NoMatch,
        Fail,
        Hang,
    }

    /// Scripted backend: counts calls, records the last submission, and
    /// answers per `reply` after an optional delay.
    struct ScriptedProcessor {
        reply: Reply,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
        last_submission: Arc<Mutex<Option<FrameSubmission>>>,
    }

    impl ScriptedProcessor {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
                last_submission: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl FrameProcessor for ScriptedProcessor {
        fn process(&self, submission: FrameSubmission) -> ProcessFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *lock_recover(&self.last_submission) = Some(submission);
            let reply = self.reply;
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match reply {
                    Reply::Match(name) => Ok(FrameResponse {
                        matched: true,
                        face_data: Some(RawDetection {
                            name: Some(name.to_string()),
                            confidence: Some(91.0),
                            ..Default::default()
                        }),
                    }),
                    Reply::NoMatch => Ok(FrameResponse {
                        matched: false,
                        face_data: None,
                    }),
                    Reply::Fail => Err(ClientError::BadUrl("scripted failure".into())),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }
    }

    struct FailingLocator;

    impl Locator for FailingLocator {
        fn resolve(&self) -> LocateFuture<'_> {
            Box::pin(async { Err(LocateError::Unavailable) })
        }
    }

    fn capture(
        source: ScriptedSource,
        processor: ScriptedProcessor,
        locator: Option<Arc<dyn Locator>>,
    ) -> (
        LiveCapture<ScriptedSource>,
        mpsc::UnboundedReceiver<LiveEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let live = LiveCapture::new(LiveConfig::default(), source, Arc::new(processor), locator, tx);
        (live, rx)
    }

    /// Let `n` ticks elapse on the paused clock.
    async fn ticks(n: u32) {
        tokio::time::sleep(TICK_INTERVAL * n + Duration::from_millis(50)).await;
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LiveEvent>) -> Vec<LiveEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_noop() {
        let (mut live, mut rx) =
            capture(ScriptedSource::new(vec![]), ScriptedProcessor::new(Reply::NoMatch), None);
        live.stop();
        live.stop();
        assert!(!live.is_streaming());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_twice_after_start_is_idempotent() {
        let (mut live, _rx) = capture(
            ScriptedSource::endless(),
            ScriptedProcessor::new(Reply::NoMatch),
            None,
        );
        live.start().await;
        assert!(live.is_streaming());
        live.stop();
        live.stop();
        assert!(!live.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_session() {
        let processor = ScriptedProcessor::new(Reply::NoMatch);
        let calls = Arc::clone(&processor.calls);
        let (mut live, _rx) = capture(ScriptedSource::endless(), processor, None);
        live.start().await;
        live.start().await;
        ticks(2).await;
        live.stop();
        // Two overlapping loops would have doubled the call count.
        assert!(calls.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_frame_means_no_submission_and_no_events() {
        let processor = ScriptedProcessor::new(Reply::Match("Alice"));
        let calls = Arc::clone(&processor.calls);
        // Source never yields a frame.
        let (mut live, mut rx) = capture(ScriptedSource::new(vec![]), processor, None);
        live.start().await;
        ticks(4).await;
        live.stop();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_emits_flash_info_event_in_order() {
        let source = ScriptedSource::new(vec![Some(test_frame())]);
        let (mut live, mut rx) = capture(source, ScriptedProcessor::new(Reply::Match("Alice")), None);
        live.start().await;
        ticks(1).await;
        live.stop();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], LiveEvent::Flash(d) if d == FLASH_DURATION));
        match &events[1] {
            LiveEvent::Info(msg) => assert_eq!(msg, "Face captured! Match found for Alice"),
            other => panic!("expected info, got {other:?}"),
        }
        match &events[2] {
            LiveEvent::Match(event) => {
                assert_eq!(event.name, "Alice");
                assert_eq!(event.confidence, 91.0);
                assert_eq!(event.source, Some(Source::Live));
                assert!(event.frame.is_some());
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_response_emits_nothing() {
        let source = ScriptedSource::new(vec![Some(test_frame())]);
        let (mut live, mut rx) = capture(source, ScriptedProcessor::new(Reply::NoMatch), None);
        live.start().await;
        ticks(1).await;
        live.stop();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_failure_reports_error_and_does_not_stream() {
        let mut source = ScriptedSource::new(vec![]);
        source.fail_open = true;
        let (mut live, mut rx) = capture(source, ScriptedProcessor::new(Reply::NoMatch), None);
        live.start().await;

        assert!(!live.is_streaming());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            LiveEvent::Error(msg) => assert!(msg.contains("Unable to access camera")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_keep_the_loop_alive() {
        let processor = ScriptedProcessor::new(Reply::Fail);
        let calls = Arc::clone(&processor.calls);
        let (mut live, mut rx) = capture(ScriptedSource::endless(), processor, None);
        live.start().await;
        ticks(4).await;

        assert!(live.is_streaming());
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(drain(&mut rx).is_empty());
        live.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_inflight_submissions_are_bounded() {
        let processor = ScriptedProcessor::new(Reply::Hang);
        let calls = Arc::clone(&processor.calls);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cfg = LiveConfig {
            tick: TICK_INTERVAL,
            inflight_limit: 2,
        };
        let mut live =
            LiveCapture::new(cfg, ScriptedSource::endless(), Arc::new(processor), None, tx);
        live.start().await;
        ticks(10).await;
        live.stop();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_after_stop_is_discarded() {
        let mut processor = ScriptedProcessor::new(Reply::Match("Alice"));
        processor.delay = Some(Duration::from_secs(5));
        let calls = Arc::clone(&processor.calls);
        let source = ScriptedSource::new(vec![Some(test_frame())]);
        let (mut live, mut rx) = capture(source, processor, None);
        live.start().await;
        // First tick fires immediately; the submission is now sleeping.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        live.stop();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_location_is_attached_to_submissions() {
        let fix = GeoFix {
            lat: 52.37,
            lon: 4.89,
            accuracy: Some(30.0),
        };
        let processor = ScriptedProcessor::new(Reply::NoMatch);
        let last = Arc::clone(&processor.last_submission);
        let source = ScriptedSource::new(vec![Some(test_frame())]);
        let (mut live, _rx) = capture(source, processor, Some(Arc::new(StaticLocator::new(fix))));
        live.start().await;
        ticks(1).await;
        live.stop();

        let submission = lock_recover(&last).clone().expect("one submission");
        assert_eq!(submission.lat, Some(52.37));
        assert_eq!(submission.lon, Some(4.89));
        assert_eq!(submission.accuracy, Some(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_failure_does_not_block_streaming() {
        let (mut live, mut rx) = capture(
            ScriptedSource::endless(),
            ScriptedProcessor::new(Reply::NoMatch),
            Some(Arc::new(FailingLocator)),
        );
        live.start().await;
        assert!(live.is_streaming());
        assert!(drain(&mut rx).is_empty());
        live.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_the_camera() {
        let source = ScriptedSource::endless();
        let released = Arc::clone(&source.released);
        let (mut live, _rx) = capture(source, ScriptedProcessor::new(Reply::NoMatch), None);
        live.start().await;
        assert!(!released.load(Ordering::SeqCst));
        live.stop();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_the_camera() {
        let source = ScriptedSource::endless();
        let released = Arc::clone(&source.released);
        let (mut live, _rx) = capture(source, ScriptedProcessor::new(Reply::NoMatch), None);
        live.start().await;
        drop(live);
        assert!(released.load(Ordering::SeqCst));
    }
}
