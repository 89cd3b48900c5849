// THEORY:
// The `LoopOrchestrator` is the real-time driver around the `Detector`. It owns the
// capture handle, decides which cycles run a detection pass, maps results back to
// full resolution, and hands records to the persistence collaborator.
//
// State machine:
//
//   Idle --start--> Capturing --first frame--> Detecting --stop--> Idle
//     ^                 |
//     +--capture error--+
//
// Key principles:
// 1.  **One Await Per Cycle**: A cycle awaits exactly one thing, the next frame.
//     Everything else (drawing, detection, scheduling saves) is synchronous, so a
//     cycle either completes or never starts.
// 2.  **Throttled Detection**: Every cycle redraws, but a pass only runs on every
//     Nth cycle and never sooner than `min_detection_interval` after the last one.
//     Passes run on a downscaled copy; boxes are mapped back by `1 / process_scale`.
// 3.  **Sticky Overlays**: The overlays of the last pass are redrawn every cycle
//     until the next pass replaces them, so boxes do not flicker between passes.
// 4.  **Fire-and-Forget Persistence**: Each save is its own spawned task. A failing
//     sink is logged and otherwise ignored; the loop never waits on it.
// 5.  **Cooperative Cancellation**: A `watch` flag is checked at the top of every
//     cycle and raced against the pending frame, so a stalled source cannot hold the
//     loop open. Once it reads "stopped" no further frame is requested, state is
//     cleared and the capture handle is released exactly once. A source with no new
//     frame is polled again after a short back-off instead of a busy loop.

use crate::config::{AquaConfig, CaptureConstraints, DetectorConfig, LoopConfig, PersistPolicy};
use crate::core_modules::frame::Frame;
use crate::core_modules::measurement::{DetectionRecord, RecordPayload};
use crate::detector::{Detector, PassReport};
use crate::error::{CaptureError, FrameError, PersistError, VisionError};
use crate::render::{Overlay, RenderSurface};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// An acquired camera (or any other frame producer).
pub trait CaptureHandle: Send {
    /// The next frame, or `None` if no new frame is ready yet.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, CaptureError>>;

    /// Stops the underlying device. Calling it more than once is harmless.
    fn release(&mut self);
}

/// Something that can hand out capture handles.
pub trait FrameSource: Send + Sync {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>>;
}

/// The persistence collaborator. Transport is entirely its own business.
pub trait RecordSink: Send + Sync {
    fn save(&self, payload: RecordPayload) -> BoxFuture<'static, Result<(), PersistError>>;
}

/// Tries each constraint set in order, bounding every attempt by `timeout`. The
/// first success wins; otherwise the last error is returned.
pub async fn acquire_with_fallbacks(
    source: &dyn FrameSource,
    ladder: &[CaptureConstraints],
    timeout: Duration,
) -> Result<Box<dyn CaptureHandle>, CaptureError> {
    let mut last_error = CaptureError::Other("no capture constraints configured".to_string());
    for (attempt, constraints) in ladder.iter().enumerate() {
        match tokio::time::timeout(timeout, source.acquire(constraints)).await {
            Ok(Ok(handle)) => {
                debug!(attempt, ?constraints, "Capture acquired");
                return Ok(handle);
            }
            Ok(Err(err)) => {
                debug!(attempt, ?constraints, error = %err, "Capture attempt failed");
                last_error = err;
            }
            Err(_) => {
                debug!(attempt, ?constraints, "Capture attempt timed out");
                last_error = CaptureError::Timeout(timeout.as_millis() as u64);
            }
        }
    }
    Err(last_error)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Capturing,
    Detecting,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No capture handle; nothing happened.
    Idle,
    /// The source had no new frame.
    FrameNotReady,
    /// The frame was drawn; no pass was due.
    Drawn,
    /// A detection pass ran and produced this many records.
    Detected(usize),
    /// A pass was due but the frame could not be processed.
    Faulted,
}

/// Running counters, exposed for display and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub cycles: u64,
    pub frames_drawn: u64,
    pub passes: u64,
    pub records: u64,
    pub frame_errors: u64,
    /// Frames drawn per second over the last full second.
    pub fps: f64,
}

/// Counts drawn frames and publishes a rate once per second.
#[derive(Debug, Clone)]
struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self, now: Instant) -> f64 {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Some(now);
        }
        self.fps
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

pub struct LoopOrchestrator {
    config: LoopConfig,
    detector_config: DetectorConfig,
    /// `None` only while a pass is running on the blocking pool.
    detector: Option<Detector>,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn RecordSink>,
    surface: Box<dyn RenderSurface>,
    handle: Option<Box<dyn CaptureHandle>>,
    state: OrchestratorState,
    overlays: Vec<Overlay>,
    latest_report: Option<PassReport>,
    latest_records: Vec<DetectionRecord>,
    last_error: Option<String>,
    last_pass_at: Option<Instant>,
    frame_counter: u64,
    stats: LoopStats,
    fps: FpsCounter,
    pending_saves: Vec<JoinHandle<()>>,
}

impl LoopOrchestrator {
    pub fn new(
        config: AquaConfig,
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn RecordSink>,
        surface: Box<dyn RenderSurface>,
    ) -> Self {
        let AquaConfig { detector, runtime } = config;
        Self {
            detector: Some(Detector::new(detector.clone())),
            detector_config: detector,
            config: runtime,
            source,
            sink,
            surface,
            handle: None,
            state: OrchestratorState::Idle,
            overlays: Vec::new(),
            latest_report: None,
            latest_records: Vec::new(),
            last_error: None,
            last_pass_at: None,
            frame_counter: 0,
            stats: LoopStats::default(),
            fps: FpsCounter::new(),
            pending_saves: Vec::new(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// User-facing message of the last capture failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn latest_report(&self) -> Option<&PassReport> {
        self.latest_report.as_ref()
    }

    /// Records of the latest pass, in full-resolution coordinates.
    pub fn latest_records(&self) -> &[DetectionRecord] {
        &self.latest_records
    }

    /// Highest-confidence record of the latest pass.
    pub fn best_record(&self) -> Option<&DetectionRecord> {
        self.latest_records.first()
    }

    pub fn surface_mut(&mut self) -> &mut dyn RenderSurface {
        self.surface.as_mut()
    }

    /// Acquires a capture handle and enters Capturing. A no-op unless Idle.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != OrchestratorState::Idle {
            return Ok(());
        }
        let source = Arc::clone(&self.source);
        match acquire_with_fallbacks(source.as_ref(), &self.config.constraints, self.config.acquire_timeout()).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.last_error = None;
                self.state = OrchestratorState::Capturing;
                info!("Capture started");
                Ok(())
            }
            Err(err) => {
                let message = err.user_message();
                warn!(error = %err, "Could not start capture: {}", message);
                self.last_error = Some(message);
                self.state = OrchestratorState::Idle;
                Err(err)
            }
        }
    }

    /// Runs cycles until `running` reads `false`, then tears down. Starts capture
    /// first if needed. A stop request is honoured even while a frame is pending.
    pub async fn run(&mut self, mut running: watch::Receiver<bool>) -> Result<LoopStats, CaptureError> {
        if self.state == OrchestratorState::Idle {
            self.start().await?;
        }

        while *running.borrow() {
            let Some(handle) = self.handle.as_mut() else {
                break;
            };
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut running) => break,
                next = handle.next_frame() => next,
            };
            match self.complete_cycle(next).await {
                Ok(CycleOutcome::Idle) => break,
                Ok(CycleOutcome::FrameNotReady) => {
                    let backoff = self.config.not_ready_backoff();
                    tokio::select! {
                        biased;
                        _ = stop_requested(&mut running) => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    self.stop();
                    return Err(err);
                }
            }
        }

        self.stop();
        info!(
            cycles = self.stats.cycles,
            passes = self.stats.passes,
            records = self.stats.records,
            "Detection loop stopped"
        );
        Ok(self.stats)
    }

    /// One scheduler tick: await a frame, redraw, and run a pass if one is due.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, CaptureError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(CycleOutcome::Idle);
        };
        // The cycle's only suspension point.
        let next = handle.next_frame().await;
        self.complete_cycle(next).await
    }

    async fn complete_cycle(
        &mut self,
        next: Result<Option<Frame>, CaptureError>,
    ) -> Result<CycleOutcome, CaptureError> {
        // --- 1. Frame ---
        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(CycleOutcome::FrameNotReady),
            Err(err) => {
                let message = err.user_message();
                error!(error = %err, "Capture failed mid-stream");
                self.last_error = Some(message);
                return Err(err);
            }
        };

        if self.state == OrchestratorState::Capturing {
            self.state = OrchestratorState::Detecting;
        }
        self.stats.cycles += 1;
        self.frame_counter += 1;

        // --- 2. Detection, if due ---
        let mut outcome = CycleOutcome::Drawn;
        if self.pass_due(&frame) {
            self.last_pass_at = Some(frame.timestamp);
            outcome = match self.detect(&frame).await {
                Ok(count) => CycleOutcome::Detected(count),
                Err(err) => {
                    self.stats.frame_errors += 1;
                    warn!(frame_id = frame.frame_id, error = %err, "Skipping frame");
                    CycleOutcome::Faulted
                }
            };
        }

        // --- 3. Redraw frame plus the latest overlays ---
        if let Err(err) = self.draw(&frame) {
            warn!(frame_id = frame.frame_id, error = %err, "Failed to draw frame");
        } else {
            self.stats.frames_drawn += 1;
            self.stats.fps = self.fps.tick(Instant::now());
        }

        Ok(outcome)
    }

    /// Clears detection state and releases the capture handle. Idempotent.
    pub fn stop(&mut self) {
        if let Some(detector) = self.detector.as_mut() {
            detector.reset();
        }
        self.overlays.clear();
        self.latest_records.clear();
        self.latest_report = None;
        self.last_pass_at = None;
        self.frame_counter = 0;
        self.fps.reset();
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            info!("Capture released");
        }
        self.state = OrchestratorState::Idle;
    }

    /// Awaits every save spawned so far.
    pub async fn flush_saves(&mut self) {
        for task in self.pending_saves.drain(..) {
            if let Err(err) = task.await {
                error!(error = %err, "Persistence task panicked");
            }
        }
    }

    fn pass_due(&self, frame: &Frame) -> bool {
        let skip = self.config.frame_skip.max(1) as u64;
        if self.frame_counter % skip != 0 {
            return false;
        }
        match self.last_pass_at {
            Some(last) => frame.timestamp.saturating_duration_since(last) >= self.config.min_detection_interval(),
            None => true,
        }
    }

    async fn detect(&mut self, frame: &Frame) -> Result<usize, FrameError> {
        let scale = self.config.process_scale;
        let small = frame.downscale(scale)?;
        let now = frame.timestamp;

        let report = if self.config.offload_detection {
            self.detect_offloaded(small, now).await?
        } else {
            self.restore_detector().process(&small, now)?
        };
        self.stats.passes += 1;

        let records = report.records(scale, frame.width, frame.height, self.detector_config.pixel_to_cm_ratio);
        self.overlays = records
            .iter()
            .enumerate()
            .map(|(i, record)| Overlay::for_record(record, i + 1))
            .collect();

        if let Some(best) = records.first() {
            info!(
                frame_id = frame.frame_id,
                detections = records.len(),
                best_confidence = best.confidence,
                length_cm = best.length_cm,
                category = %best.size_category,
                tilapia = best.is_target_species,
                "Fish detected"
            );
        }

        self.persist(&records);
        self.stats.records += records.len() as u64;
        let count = records.len();
        self.latest_records = records;
        self.latest_report = Some(report);
        Ok(count)
    }

    /// Moves the detector onto the blocking pool for one pass and back.
    async fn detect_offloaded(&mut self, small: Frame, now: Instant) -> Result<PassReport, FrameError> {
        let mut detector = match self.detector.take() {
            Some(detector) => detector,
            None => Detector::new(self.detector_config.clone()),
        };
        let joined = tokio::task::spawn_blocking(move || {
            let result = detector.process(&small, now);
            (detector, result)
        })
        .await;

        match joined {
            Ok((detector, result)) => {
                self.detector = Some(detector);
                result
            }
            Err(err) => {
                error!(error = %err, "Detection worker failed; detector state was lost");
                self.restore_detector();
                Err(FrameError::WorkerFailed(err.to_string()))
            }
        }
    }

    fn restore_detector(&mut self) -> &mut Detector {
        self.detector
            .get_or_insert_with(|| Detector::new(self.detector_config.clone()))
    }

    fn persist(&mut self, records: &[DetectionRecord]) {
        self.pending_saves.retain(|task| !task.is_finished());
        let selected: &[DetectionRecord] = match self.config.persist_policy {
            PersistPolicy::All => records,
            PersistPolicy::BestOnly => &records[..records.len().min(1)],
        };
        for record in selected {
            let save = self.sink.save(RecordPayload::from(record));
            self.pending_saves.push(tokio::spawn(async move {
                if let Err(err) = save.await {
                    warn!(error = %err, "Failed to persist detection record");
                }
            }));
        }
    }

    fn draw(&mut self, frame: &Frame) -> Result<(), VisionError> {
        self.surface.draw_frame(frame)?;
        for overlay in &self.overlays {
            self.surface.draw_overlay(overlay)?;
        }
        self.surface.present()
    }
}

/// Resolves once `running` reads `false`. Never resolves if the flag can no longer
/// change.
async fn stop_requested(running: &mut watch::Receiver<bool>) {
    let stopped = running.wait_for(|running| !*running).await.is_ok();
    if !stopped {
        futures::future::pending::<()>().await;
    }
}

impl Drop for LoopOrchestrator {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NullSurface;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedHandle {
        frames: VecDeque<Option<Frame>>,
        released: Arc<AtomicUsize>,
        running: Option<Arc<watch::Sender<bool>>>,
    }

    impl CaptureHandle for ScriptedHandle {
        fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, CaptureError>> {
            let next = match self.frames.pop_front() {
                Some(next) => next,
                None => {
                    if let Some(running) = &self.running {
                        let _ = running.send(false);
                    }
                    None
                }
            };
            Box::pin(async move { Ok(next) })
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fails the first `failures` attempts with `error`, then hands out frames.
    struct ScriptedSource {
        failures: usize,
        error: CaptureError,
        attempts: AtomicUsize,
        frames: Mutex<Option<VecDeque<Option<Frame>>>>,
        released: Arc<AtomicUsize>,
        running: Option<Arc<watch::Sender<bool>>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Option<Frame>>, running: Option<watch::Sender<bool>>) -> Self {
            Self {
                failures: 0,
                error: CaptureError::NoDevice,
                attempts: AtomicUsize::new(0),
                frames: Mutex::new(Some(frames.into())),
                released: Arc::new(AtomicUsize::new(0)),
                running: running.map(Arc::new),
            }
        }

        fn failing(failures: usize, error: CaptureError) -> Self {
            Self {
                failures,
                error,
                ..Self::new(Vec::new(), None)
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn acquire<'a>(
            &'a self,
            _constraints: &'a CaptureConstraints,
        ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>> {
            Box::pin(async move {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < self.failures {
                    return Err(self.error.clone());
                }
                let frames = self.frames.lock().unwrap().take().unwrap_or_default();
                Ok(Box::new(ScriptedHandle {
                    frames,
                    released: Arc::clone(&self.released),
                    running: self.running.clone(),
                }) as Box<dyn CaptureHandle>)
            })
        }
    }

    struct HangingSource;

    impl FrameSource for HangingSource {
        fn acquire<'a>(
            &'a self,
            _constraints: &'a CaptureConstraints,
        ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>> {
            Box::pin(futures::future::pending())
        }
    }

    /// A camera that was opened but never delivers, or never has a new frame.
    struct StalledHandle {
        hang: bool,
        polls: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl CaptureHandle for StalledHandle {
        fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, CaptureError>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                Box::pin(futures::future::pending())
            } else {
                Box::pin(async { Ok(None) })
            }
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StalledSource {
        hang: bool,
        polls: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl StalledSource {
        fn new(hang: bool) -> Self {
            Self {
                hang,
                polls: Arc::new(AtomicUsize::new(0)),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FrameSource for StalledSource {
        fn acquire<'a>(
            &'a self,
            _constraints: &'a CaptureConstraints,
        ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>> {
            Box::pin(async move {
                Ok(Box::new(StalledHandle {
                    hang: self.hang,
                    polls: Arc::clone(&self.polls),
                    released: Arc::clone(&self.released),
                }) as Box<dyn CaptureHandle>)
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<RecordPayload>>,
    }

    impl RecordSink for Arc<MemorySink> {
        fn save(&self, payload: RecordPayload) -> BoxFuture<'static, Result<(), PersistError>> {
            let sink = Arc::clone(self);
            Box::pin(async move {
                sink.saved.lock().unwrap().push(payload);
                Ok(())
            })
        }
    }

    fn blank(id: u64, at: Instant) -> Frame {
        Frame::new(64, 48, vec![40; 64 * 48 * 4])
            .unwrap()
            .with_id(id)
            .with_timestamp(at)
    }

    fn fast_config() -> AquaConfig {
        let mut config = AquaConfig::default();
        config.runtime.frame_skip = 1;
        config.runtime.min_detection_interval_ms = 0;
        config.runtime.process_scale = 1.0;
        config
    }

    fn orchestrator(config: AquaConfig, source: Arc<dyn FrameSource>) -> LoopOrchestrator {
        let sink: Arc<dyn RecordSink> = Arc::new(Arc::new(MemorySink::default()));
        LoopOrchestrator::new(config, source, sink, Box::new(NullSurface))
    }

    #[tokio::test]
    async fn capture_failure_stays_idle_with_message() {
        let source = Arc::new(ScriptedSource::failing(usize::MAX, CaptureError::PermissionDenied));
        let mut orchestrator = orchestrator(AquaConfig::default(), source.clone());

        let result = orchestrator.start().await;
        assert_eq!(result, Err(CaptureError::PermissionDenied));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(
            orchestrator.last_error(),
            Some("Failed to access camera. Please grant camera permissions.")
        );
        // Every rung of the ladder was tried.
        assert_eq!(source.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn falls_back_through_the_constraint_ladder() {
        let source = Arc::new(ScriptedSource::failing(2, CaptureError::DeviceBusy));
        let mut orchestrator = orchestrator(AquaConfig::default(), source.clone());

        orchestrator.start().await.unwrap();
        assert_eq!(source.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(orchestrator.state(), OrchestratorState::Capturing);
        assert!(orchestrator.last_error().is_none());
    }

    #[tokio::test]
    async fn acquisition_times_out() {
        let mut config = AquaConfig::default();
        config.runtime.acquire_timeout_ms = 10;
        config.runtime.constraints = vec![CaptureConstraints::default()];
        let mut orchestrator = orchestrator(config, Arc::new(HangingSource));

        assert_eq!(orchestrator.start().await, Err(CaptureError::Timeout(10)));
        assert_eq!(
            orchestrator.last_error(),
            Some("Failed to access camera. Timeout waiting for video.")
        );
    }

    #[tokio::test]
    async fn first_frame_enters_detecting_and_not_ready_is_skipped() {
        let start = Instant::now();
        let source = Arc::new(ScriptedSource::new(vec![None, Some(blank(1, start))], None));
        let mut orchestrator = orchestrator(fast_config(), source);
        orchestrator.start().await.unwrap();

        assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::FrameNotReady));
        assert_eq!(orchestrator.state(), OrchestratorState::Capturing);
        assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Detected(0)));
        assert_eq!(orchestrator.state(), OrchestratorState::Detecting);
        assert_eq!(orchestrator.stats().cycles, 1);
    }

    #[tokio::test]
    async fn passes_run_every_nth_cycle() {
        let start = Instant::now();
        let frames = (1..=6)
            .map(|i| Some(blank(i, start + Duration::from_millis(i * 200))))
            .collect();
        let (running_tx, running_rx) = watch::channel(true);
        let source = Arc::new(ScriptedSource::new(frames, Some(running_tx)));
        let mut config = fast_config();
        config.runtime.frame_skip = 3;
        let mut orchestrator = orchestrator(config, source);

        let stats = orchestrator.run(running_rx).await.unwrap();
        assert_eq!(stats.cycles, 6);
        assert_eq!(stats.frames_drawn, 6);
        assert_eq!(stats.passes, 2);
    }

    #[tokio::test]
    async fn passes_are_throttled_by_interval() {
        let start = Instant::now();
        let frames = [0u64, 50, 120, 150, 260]
            .iter()
            .enumerate()
            .map(|(i, ms)| Some(blank(i as u64, start + Duration::from_millis(*ms))))
            .collect();
        let (running_tx, running_rx) = watch::channel(true);
        let source = Arc::new(ScriptedSource::new(frames, Some(running_tx)));
        let mut config = fast_config();
        config.runtime.min_detection_interval_ms = 100;
        let mut orchestrator = orchestrator(config, source);

        let stats = orchestrator.run(running_rx).await.unwrap();
        // Passes at 0, 120 and 260 ms.
        assert_eq!(stats.passes, 3);
    }

    #[tokio::test]
    async fn stop_releases_the_handle_once() {
        let source = Arc::new(ScriptedSource::new(vec![Some(blank(1, Instant::now()))], None));
        let released = Arc::clone(&source.released);
        let mut orchestrator = orchestrator(fast_config(), source);
        orchestrator.start().await.unwrap();
        orchestrator.cycle().await.unwrap();

        orchestrator.stop();
        orchestrator.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(orchestrator.overlays().is_empty());
        assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Idle));
    }

    #[tokio::test]
    async fn stopped_flag_prevents_any_frame_request() {
        let source = Arc::new(ScriptedSource::new(vec![Some(blank(1, Instant::now()))], None));
        let released = Arc::clone(&source.released);
        let mut orchestrator = orchestrator(fast_config(), source);
        let (_running_tx, running_rx) = watch::channel(false);

        let stats = orchestrator.run(running_rx).await.unwrap();
        assert_eq!(stats.cycles, 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_interrupts_a_stalled_frame_request() {
        let source = Arc::new(StalledSource::new(true));
        let released = Arc::clone(&source.released);
        let mut orchestrator = orchestrator(fast_config(), source);
        let (running_tx, running_rx) = watch::channel(true);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            running_tx.send_replace(false);
        });

        let stats = tokio::time::timeout(Duration::from_secs(1), orchestrator.run(running_rx))
            .await
            .expect("run should return after the stop request")
            .unwrap();
        assert_eq!(stats.cycles, 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn not_ready_source_is_polled_with_back_off() {
        let source = Arc::new(StalledSource::new(false));
        let polls = Arc::clone(&source.polls);
        let released = Arc::clone(&source.released);
        let mut config = fast_config();
        config.runtime.not_ready_backoff_ms = 20;
        let mut orchestrator = orchestrator(config, source);
        let (running_tx, running_rx) = watch::channel(true);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            running_tx.send_replace(false);
        });

        let stats = tokio::time::timeout(Duration::from_secs(1), orchestrator.run(running_rx))
            .await
            .expect("run should return after the stop request")
            .unwrap();
        assert_eq!(stats.cycles, 0);
        // Roughly one poll per back-off period, not a busy loop.
        let polls = polls.load(Ordering::SeqCst);
        assert!((1..=10).contains(&polls), "polled {polls} times");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn offloaded_detection_returns_the_detector() {
        let start = Instant::now();
        let frames = (0..3)
            .map(|i| Some(blank(i, start + Duration::from_millis(i * 10))))
            .collect();
        let (running_tx, running_rx) = watch::channel(true);
        let source = Arc::new(ScriptedSource::new(frames, Some(running_tx)));
        let mut config = fast_config();
        config.runtime.offload_detection = true;
        let mut orchestrator = orchestrator(config, source);

        let stats = orchestrator.run(running_rx).await.unwrap();
        assert_eq!(stats.passes, 3);
        assert!(orchestrator.detector.is_some());
    }

    #[test]
    fn fps_counter_publishes_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new();
        for i in 0..30 {
            fps.tick(start + Duration::from_millis(i * 33));
        }
        assert_eq!(fps.fps, 0.0);
        let rate = fps.tick(start + Duration::from_millis(1000));
        assert!((rate - 31.0).abs() < 1e-9);
    }
}
