// THEORY:
// This file is the main entry point for the `aqua_vision` library crate. It exposes
// two levels of API:
//
// 1.  `Detector`: a single synchronous detection pass over one frame, for callers
//     that run their own loop or process stills.
// 2.  `LoopOrchestrator`: the real-time async loop around the detector, talking to
//     the outside world only through the `FrameSource`, `RecordSink` and
//     `RenderSurface` traits.
//
// The stage implementations (`core_modules`) stay public so the individual
// heuristics can be exercised and tuned in isolation, but most consumers only need
// the re-exports below.

pub mod config;
pub mod core_modules;
pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod render;

pub use config::{
    AquaConfig, CaptureConstraints, DetectorConfig, FacingMode, LoopConfig, PersistPolicy, ScoreWeights,
    SpeciesConfig,
};
pub use core_modules::bounding_box::{BoundingBox, Point};
pub use core_modules::feature_scorer::feature_scorer::ScoreBreakdown;
pub use core_modules::frame::Frame;
pub use core_modules::measurement::{DetectionRecord, Measurement, RecordPayload, SizeCategory};
pub use detector::{Detection, Detector, PassReport, StageCounts};
pub use error::{CaptureError, ConfigError, FrameError, PersistError, VisionError};
pub use orchestrator::{
    CaptureHandle, CycleOutcome, FrameSource, LoopOrchestrator, LoopStats, OrchestratorState, RecordSink,
    acquire_with_fallbacks,
};
pub use render::{NullSurface, Overlay, RenderSurface, RgbaCanvas};
