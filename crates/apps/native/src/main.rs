//! Headless preview: mounts a page of effect blocks on a recording backend,
//! drives it for a fixed number of frames and logs what was drawn.
//!
//! Environment:
//! - `PREVIEW_FRAMES` (default 120) and `PREVIEW_FPS` (default 60).
//! - `PREVIEW_PAGE`: path to a page JSON; a built-in demo page otherwise.
//! - `RUST_LOG` filters log output.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use effects::{Block, EffectError, PageSpec};
use foundation::time::Time;
use gpu::{DrawBackend, RecordingBackend, SharedSurface, Stage, StageConfig, SurfaceError, TextureData};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_PAGE: &str = r#"{
    "blocks": [
        {"id": "background", "kind": "fluid", "config": {"intensity": 0.8}},
        {"id": "hero-card", "kind": "glass", "config": {"variant": "frost", "intensity": 0.6}, "zOrder": 1},
        {"id": "gallery", "kind": "carousel", "config": {"slides": ["slide-1.jpg", "slide-2.jpg"], "autoplay": 0.5}},
        {"id": "feature-image", "kind": "distortion", "config": {"src": "feature.jpg"}}
    ]
}"#;

const WIDTH: f64 = 1280.0;
const HEIGHT: f64 = 720.0;

#[derive(Debug)]
enum PreviewError {
    Io(io::Error),
    Json(serde_json::Error),
    Surface(SurfaceError),
    Effect { block: String, source: EffectError },
}

impl fmt::Display for PreviewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewError::Io(err) => write!(f, "reading page: {err}"),
            PreviewError::Json(err) => write!(f, "parsing page: {err}"),
            PreviewError::Surface(err) => write!(f, "surface: {err}"),
            PreviewError::Effect { block, source } => write!(f, "block `{block}`: {source}"),
        }
    }
}

impl std::error::Error for PreviewError {}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), PreviewError> {
    let frames = env_var_usize("PREVIEW_FRAMES", 120);
    let fps = env_var_f64("PREVIEW_FPS", 60.0).max(1.0);
    let page = load_page(env::var("PREVIEW_PAGE").ok().as_deref())?;

    let probe = RecordingBackend::new();
    let backend = probe.clone();
    let stage = Stage::new(StageConfig::default(), move || {
        Ok(Box::new(backend) as Box<dyn DrawBackend>)
    })
    .map_err(PreviewError::Surface)?;
    stage.resize(WIDTH, HEIGHT, 1.0).map_err(PreviewError::Surface)?;

    let blocks = page
        .blocks
        .iter()
        .map(|spec| {
            Block::mount(&stage, spec).map_err(|source| PreviewError::Effect {
                block: spec.id.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(blocks = blocks.len(), frames, fps, "preview started");

    let dt = 1.0 / fps;
    for i in 0..frames {
        let now = Time(i as f64 * dt);
        resolve_textures(stage.surface());
        sweep_pointer(&stage, i, frames, now);
        if i == frames / 4 {
            hover_all(&blocks, true);
        } else if i == frames * 3 / 4 {
            hover_all(&blocks, false);
        }
        stage.frame(now);
    }

    let stats = stage.surface().stats();
    let last = probe.last_frame();
    info!(
        drawn = stats.frames_drawn,
        skipped = stats.ticks_skipped,
        failures = stats.draw_failures,
        commands = last.as_ref().map_or(0, |f| f.commands.len()),
        "preview finished"
    );
    if let Some(frame) = last {
        for command in &frame.commands {
            info!(mount = %command.mount, z = command.z_order, "drawn");
        }
    }
    Ok(())
}

fn load_page(path: Option<&str>) -> Result<PageSpec, PreviewError> {
    let text = match path {
        Some(path) => fs::read_to_string(path).map_err(PreviewError::Io)?,
        None => DEMO_PAGE.to_string(),
    };
    serde_json::from_str(&text).map_err(PreviewError::Json)
}

/// Local files stand in for fetched images: an existing path loads as a
/// placeholder texel, anything else fails.
fn resolve_textures(surface: &SharedSurface) {
    for (id, src) in surface.take_pending_loads() {
        let result = if Path::new(&src).is_file() {
            Ok(TextureData::solid([128, 128, 128, 255]))
        } else {
            Err(format!("{src}: no such file"))
        };
        surface.complete_texture(id, result);
    }
}

/// Moves the pointer left to right across the surface over the run.
fn sweep_pointer(stage: &Stage, i: usize, frames: usize, now: Time) {
    let t = i as f64 / frames.max(1) as f64;
    stage.pointer().pointer_move(t * WIDTH, HEIGHT * 0.5, now);
}

fn hover_all(blocks: &[Block], hovered: bool) {
    use effects::Effect;
    for block in blocks {
        if let Err(err) = block.set_hover(hovered) {
            warn!(block = %block.id(), error = %err, "hover failed");
        }
    }
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
