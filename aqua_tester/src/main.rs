// THEORY:
// The visual tester drives the full `LoopOrchestrator` over a directory of still
// frames instead of a live camera, so detector changes can be checked by eye and
// diffed run to run. Frames play back in file-name order at a nominal frame rate;
// every drawn cycle is written out as a PNG with the detection boxes burnt in, and
// every persisted record is appended to a JSON-lines file.

use anyhow::{Context, Result};
use aqua_vision::{
    AquaConfig, CaptureConstraints, CaptureError, CaptureHandle, Frame, FrameSource, LoopOrchestrator, Overlay,
    PersistError, RecordPayload, RecordSink, RenderSurface, RgbaCanvas, VisionError,
};
use clap::Parser;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Runs the fish detector over a directory of frames and writes annotated output.
#[derive(Parser, Debug)]
#[command(name = "aqua_tester", version)]
struct Cli {
    /// Directory of input frames, played back in file-name order.
    input: PathBuf,
    /// Directory that receives annotated frames and `records.jsonl`.
    output: PathBuf,
    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Nominal playback rate used to timestamp frames.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
}

// --- Frame source ---

struct DirectorySource {
    paths: Vec<PathBuf>,
    frame_interval: Duration,
    running: Arc<watch::Sender<bool>>,
}

impl DirectorySource {
    fn scan(dir: &Path, fps: f64, running: Arc<watch::Sender<bool>>) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading input directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();
        let fps = if fps > 0.0 { fps } else { 30.0 };
        Ok(Self {
            paths,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            running,
        })
    }
}

impl FrameSource for DirectorySource {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureHandle>, CaptureError>> {
        Box::pin(async move {
            if self.paths.is_empty() {
                return Err(CaptureError::NoDevice);
            }
            debug!(?constraints, frames = self.paths.len(), "Opening frame directory");
            Ok(Box::new(DirectoryHandle {
                pending: self.paths.iter().cloned().collect(),
                next_id: 0,
                start: Instant::now(),
                frame_interval: self.frame_interval,
                running: Arc::clone(&self.running),
                released: false,
            }) as Box<dyn CaptureHandle>)
        })
    }
}

struct DirectoryHandle {
    pending: VecDeque<PathBuf>,
    next_id: u64,
    start: Instant,
    frame_interval: Duration,
    running: Arc<watch::Sender<bool>>,
    released: bool,
}

impl CaptureHandle for DirectoryHandle {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, CaptureError>> {
        Box::pin(async move {
            let Some(path) = self.pending.pop_front() else {
                // End of playback: ask the loop to wind down.
                self.running.send_replace(false);
                return Ok(None);
            };
            let image = image::open(&path)
                .map_err(|e| CaptureError::Other(format!("{}: {}", path.display(), e)))?
                .to_rgba8();
            let timestamp = self.start + self.frame_interval * self.next_id as u32;
            let frame = Frame::from_rgba_image(image)
                .map_err(|e| CaptureError::Other(format!("{}: {}", path.display(), e)))?
                .with_id(self.next_id)
                .with_timestamp(timestamp);
            self.next_id += 1;
            Ok(Some(frame))
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.pending.clear();
            debug!("Frame directory released");
        }
    }
}

// --- Persistence ---

struct JsonLinesSink {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl JsonLinesSink {
    async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl RecordSink for JsonLinesSink {
    fn save(&self, payload: RecordPayload) -> BoxFuture<'static, Result<(), PersistError>> {
        let file = Arc::clone(&self.file);
        Box::pin(async move {
            let mut line = serde_json::to_string(&payload)?;
            line.push('\n');
            let mut file = file.lock().await;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            Ok(())
        })
    }
}

// --- Rendering ---

struct PngSurface {
    canvas: RgbaCanvas,
    output_dir: PathBuf,
    written: u64,
}

impl RenderSurface for PngSurface {
    fn draw_frame(&mut self, frame: &Frame) -> Result<(), VisionError> {
        self.canvas.draw_frame(frame)
    }

    fn draw_overlay(&mut self, overlay: &Overlay) -> Result<(), VisionError> {
        debug!(label = %overlay.label, color = %overlay.color_hex(), "Overlay");
        self.canvas.draw_overlay(overlay)
    }

    fn present(&mut self) -> Result<(), VisionError> {
        if let Some(image) = self.canvas.image() {
            let path = self.output_dir.join(format!("frame_{:05}.png", self.written));
            image.save(&path)?;
            self.written += 1;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AquaConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AquaConfig::default(),
    };
    tokio::fs::create_dir_all(&cli.output)
        .await
        .with_context(|| format!("creating output directory {}", cli.output.display()))?;

    // --- 2. Collaborators ---
    let (running_tx, running_rx) = watch::channel(true);
    let running_tx = Arc::new(running_tx);
    let source = DirectorySource::scan(&cli.input, cli.fps, Arc::clone(&running_tx))?;
    info!(frames = source.paths.len(), input = %cli.input.display(), "Loaded frame directory");
    let sink = JsonLinesSink::create(&cli.output.join("records.jsonl")).await?;
    let surface = PngSurface {
        canvas: RgbaCanvas::new(),
        output_dir: cli.output.clone(),
        written: 0,
    };

    let mut orchestrator = LoopOrchestrator::new(config, Arc::new(source), Arc::new(sink), Box::new(surface));

    // --- 3. Ctrl-C stops the loop after the current cycle ---
    let interrupt = Arc::clone(&running_tx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.send_replace(false);
        }
    });

    // --- 4. Main Processing Loop ---
    let stats = match orchestrator.run(running_rx).await {
        Ok(stats) => stats,
        Err(err) => {
            error!("{}", err.user_message());
            return Err(err.into());
        }
    };
    orchestrator.flush_saves().await;

    info!(
        cycles = stats.cycles,
        passes = stats.passes,
        records = stats.records,
        frame_errors = stats.frame_errors,
        output = %cli.output.display(),
        "Processing complete"
    );
    Ok(())
}
