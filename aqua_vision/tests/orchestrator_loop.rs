mod common;

use aqua_vision::{
    AquaConfig, CaptureConstraints, CaptureError, CaptureHandle, CycleOutcome, Frame, FrameSource,
    LoopOrchestrator, NullSurface, OrchestratorState, PersistError, PersistPolicy, RecordPayload, RecordSink,
};
use common::{Fish, scene_at};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

struct QueueHandle {
    frames: VecDeque<Frame>,
    running: Arc<watch::Sender<bool>>,
}

impl CaptureHandle for QueueHandle {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, CaptureError>> {
        let next = self.frames.pop_front();
        if next.is_none() {
            self.running.send_replace(false);
        }
        Box::pin(async move { Ok(next) })
    }

    fn release(&mut self) {
        self.frames.clear();
    }
}

struct QueueSource {
    frames: Mutex<Option<Vec<Frame>>>,
    running: Arc<watch::Sender<bool>>,
}

impl FrameSource for QueueSource {
    fn acquire<'a>(
        &'a self,
        _constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>> {
        Box::pin(async move {
            let frames = self.frames.lock().unwrap().take().ok_or(CaptureError::DeviceBusy)?;
            Ok(Box::new(QueueHandle {
                frames: frames.into(),
                running: Arc::clone(&self.running),
            }) as Box<dyn CaptureHandle>)
        })
    }
}

#[derive(Clone, Default)]
struct MemorySink {
    saved: Arc<Mutex<Vec<RecordPayload>>>,
    fail: bool,
}

impl RecordSink for MemorySink {
    fn save(&self, payload: RecordPayload) -> BoxFuture<'static, Result<(), PersistError>> {
        let saved = Arc::clone(&self.saved);
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                return Err(PersistError::Transport("offline".to_string()));
            }
            saved.lock().unwrap().push(payload);
            Ok(())
        })
    }
}

fn config(policy: PersistPolicy) -> AquaConfig {
    let mut config = AquaConfig::default();
    config.runtime.frame_skip = 1;
    config.runtime.min_detection_interval_ms = 100;
    config.runtime.process_scale = 1.0;
    config.runtime.persist_policy = policy;
    config
}

fn build(
    config: AquaConfig,
    frames: Vec<Frame>,
    sink: MemorySink,
) -> (LoopOrchestrator, watch::Receiver<bool>) {
    let (running_tx, running_rx) = watch::channel(true);
    let source = QueueSource {
        frames: Mutex::new(Some(frames)),
        running: Arc::new(running_tx),
    };
    let orchestrator = LoopOrchestrator::new(config, Arc::new(source), Arc::new(sink), Box::new(NullSurface));
    (orchestrator, running_rx)
}

fn swimming(fish: &[Fish], start: Instant, timestamps_ms: &[u64]) -> Vec<Frame> {
    timestamps_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| {
            let moved: Vec<Fish> = fish.iter().map(|f| f.shifted(2 * i as u32)).collect();
            scene_at(400, 300, &moved, i as u64, start + Duration::from_millis(*ms))
        })
        .collect()
}

#[tokio::test]
async fn detection_is_drawn_persisted_and_kept_between_passes() {
    let start = Instant::now();
    let frames = swimming(&[Fish::at(100, 120)], start, &[0, 150, 170]);
    let sink = MemorySink::default();
    let (mut orchestrator, _running) = build(config(PersistPolicy::All), frames, sink.clone());

    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Capturing);

    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Detected(0)));
    assert_eq!(orchestrator.state(), OrchestratorState::Detecting);
    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Detected(1)));

    let overlays = orchestrator.overlays().to_vec();
    assert_eq!(overlays.len(), 1);
    assert!(overlays[0].label.starts_with("Tilapia 1 "));
    assert_eq!(overlays[0].color_hex(), "#00ff00");
    assert_eq!(overlays[0].thickness, 4);

    // 20 ms later: too soon for a pass, the overlay stays.
    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Drawn));
    assert_eq!(orchestrator.overlays(), overlays.as_slice());

    let best = orchestrator.best_record().unwrap();
    assert_eq!(best.bounding_box.width, 151);
    assert!(best.is_target_species);

    orchestrator.flush_saves().await;
    let saved = sink.saved.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].category, "Large");
    assert_eq!(saved[0].length, "12.08");
    assert_eq!(saved[0].width, "4.08");

    orchestrator.stop();
    assert!(orchestrator.overlays().is_empty());
    assert!(orchestrator.latest_report().is_none());
    assert!(orchestrator.best_record().is_none());
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
}

#[tokio::test]
async fn corrupt_frame_is_skipped_and_the_loop_recovers() {
    let start = Instant::now();
    let mut frames = swimming(&[Fish::at(100, 120)], start, &[0, 150, 300]);
    frames[0].data.truncate(12);
    let (mut orchestrator, _running) = build(config(PersistPolicy::All), frames, MemorySink::default());

    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Faulted));
    assert_eq!(orchestrator.stats().frame_errors, 1);
    assert!(orchestrator.latest_report().is_none());

    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Detected(0)));
    assert_eq!(orchestrator.cycle().await, Ok(CycleOutcome::Detected(1)));
    let stats = orchestrator.stats();
    assert_eq!(stats.frame_errors, 1);
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.passes, 2);
}

#[tokio::test]
async fn best_only_policy_saves_one_record_per_pass() {
    let start = Instant::now();
    let school = [Fish::at(20, 20), Fish::at(220, 200)];
    let frames = swimming(&school, start, &[0, 150]);
    let sink = MemorySink::default();
    let (mut orchestrator, running) = build(config(PersistPolicy::BestOnly), frames, sink.clone());

    let stats = orchestrator.run(running).await.unwrap();
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.records, 2);
    orchestrator.flush_saves().await;
    assert_eq!(sink.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn all_policy_saves_every_record() {
    let start = Instant::now();
    let school = [Fish::at(20, 20), Fish::at(220, 200)];
    let frames = swimming(&school, start, &[0, 150]);
    let sink = MemorySink::default();
    let (mut orchestrator, running) = build(config(PersistPolicy::All), frames, sink.clone());

    orchestrator.run(running).await.unwrap();
    orchestrator.flush_saves().await;
    assert_eq!(sink.saved.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn failing_sink_does_not_stop_the_loop() {
    let start = Instant::now();
    let frames = swimming(&[Fish::at(100, 120)], start, &[0, 150, 300, 450]);
    let sink = MemorySink {
        fail: true,
        ..MemorySink::default()
    };
    let (mut orchestrator, running) = build(config(PersistPolicy::All), frames, sink.clone());

    let stats = orchestrator.run(running).await.unwrap();
    orchestrator.flush_saves().await;
    assert_eq!(stats.cycles, 4);
    assert!(stats.records >= 1);
    assert!(sink.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn downscaled_passes_report_full_resolution_boxes() {
    let start = Instant::now();
    let frames = swimming(&[Fish::at(100, 120)], start, &[0, 150, 300, 450, 600]);
    let mut config = config(PersistPolicy::All);
    config.runtime.process_scale = 0.6;
    let (mut orchestrator, _running) = build(config, frames, MemorySink::default());

    orchestrator.start().await.unwrap();
    for _ in 0..5 {
        orchestrator.cycle().await.unwrap();
        for record in orchestrator.latest_records() {
            assert!(record.bounding_box.fits_within(400, 300));
        }
        if let Some(report) = orchestrator.latest_report() {
            assert!(report.width < 400 && report.height < 300);
        }
    }
    assert_eq!(orchestrator.stats().passes, 5);
}

#[tokio::test]
async fn exhausted_source_is_busy_on_restart() {
    let (mut orchestrator, running) = build(config(PersistPolicy::All), Vec::new(), MemorySink::default());
    orchestrator.run(running).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);

    assert_eq!(orchestrator.start().await, Err(CaptureError::DeviceBusy));
    assert_eq!(
        orchestrator.last_error(),
        Some("Failed to access camera. Camera is already in use.")
    );
}
