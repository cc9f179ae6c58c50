use console_error_panic_hook::set_once;
use gloo_net::http::Request;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

use effects::{Block, BlockSpec, CarouselEffect, Effect, EffectKind, PageSpec};
use foundation::Id;
use foundation::time::Time;
use gpu::{DrawBackend, SharedSurface, Stage, StageConfig};
use scene::components::ResourceId;
use scene::{ViewAnchor, ViewRegistration};

mod anchor;
mod backend;
mod images;
use anchor::ElementAnchor;
use backend::init_backend;

/// Counters handed to the page as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub frames_drawn: u64,
    pub ticks_skipped: u64,
    pub draw_failures: u64,
    pub mounted: usize,
    pub reduced_motion: bool,
}

/// Everything the page talks to: the stage, the blocks mounted on it by
/// id and the views registered for them.
pub struct App {
    stage: Stage,
    blocks: BTreeMap<String, Block>,
    views: BTreeMap<String, ViewRegistration>,
    now: Time,
}

impl App {
    pub fn new(config: StageConfig, backend: Box<dyn DrawBackend>) -> Result<Self, String> {
        let stage = Stage::new(config, move || Ok(backend)).map_err(|e| e.to_string())?;
        Ok(Self {
            stage,
            blocks: BTreeMap::new(),
            views: BTreeMap::new(),
            now: Time(0.0),
        })
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Runs one frame and returns the texture loads it queued.
    pub fn frame(&mut self, now: Time) -> Vec<(ResourceId, String)> {
        self.now = now;
        self.stage.frame(now);
        self.stage.surface().take_pending_loads()
    }

    pub fn resize(&self, width: f64, height: f64, pixel_ratio: f64) -> Result<(), String> {
        self.stage
            .resize(width, height, pixel_ratio)
            .map_err(|e| e.to_string())
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        self.stage.pointer().pointer_move(x, y, self.now);
    }

    /// The block under the pointer, if any.
    pub fn hovered_block(&self) -> Option<String> {
        let id = self.stage.hit_test()?;
        self.blocks.contains_key(id.as_str()).then(|| id.as_str().to_string())
    }

    pub fn register_view(&mut self, id: &str, anchor: impl ViewAnchor + 'static) -> Result<(), String> {
        let registration = self
            .stage
            .views()
            .register_view(id, anchor)
            .map_err(|e| e.to_string())?;
        self.views.insert(id.to_string(), registration);
        self.stage.surface().invalidate();
        Ok(())
    }

    pub fn unregister_view(&mut self, id: &str) -> bool {
        let removed = self.views.remove(id).is_some();
        if removed {
            self.stage.surface().invalidate();
        }
        removed
    }

    pub fn set_view_intersecting(&self, id: &str, intersecting: bool) -> Result<(), String> {
        self.stage
            .set_view_intersecting(&Id::new(id), intersecting)
            .map_err(|e| e.to_string())
    }

    pub fn mount_block(&mut self, spec: &BlockSpec) -> Result<(), String> {
        if self.blocks.contains_key(&spec.id) {
            return Err(format!("block `{}` is already mounted", spec.id));
        }
        let block = Block::mount(&self.stage, spec).map_err(|e| format!("block `{}`: {e}", spec.id))?;
        self.blocks.insert(spec.id.clone(), block);
        Ok(())
    }

    /// Mounts every block of `page`, stopping at the first failure.
    pub fn mount_page(&mut self, page: &PageSpec) -> Result<usize, String> {
        for spec in &page.blocks {
            self.mount_block(spec)?;
        }
        Ok(page.blocks.len())
    }

    pub fn unmount_block(&mut self, id: &str) -> bool {
        self.blocks.remove(id).is_some()
    }

    fn block(&self, id: &str) -> Result<&Block, String> {
        self.blocks
            .get(id)
            .ok_or_else(|| format!("no block `{id}`"))
    }

    pub fn set_block_hover(&self, id: &str, hovered: bool) -> Result<(), String> {
        self.block(id)?
            .set_hover(hovered)
            .map_err(|e| e.to_string())
    }

    pub fn carousel(&self, id: &str) -> Result<&CarouselEffect, String> {
        self.block(id)?
            .as_carousel()
            .ok_or_else(|| format!("block `{id}` is not a carousel"))
    }

    pub fn stats(&self) -> StatsView {
        let surface = self.stage.surface();
        let stats = surface.stats();
        StatsView {
            frames_drawn: stats.frames_drawn,
            ticks_skipped: stats.ticks_skipped,
            draw_failures: stats.draw_failures,
            mounted: surface.mounted_ids().len(),
            reduced_motion: self.stage.reduced_motion(),
        }
    }
}

/// Parses stage configuration; an empty string means defaults.
pub fn stage_config(json: &str) -> Result<StageConfig, String> {
    if json.trim().is_empty() {
        return Ok(StageConfig::default());
    }
    serde_json::from_str(json).map_err(|e| format!("stage config: {e}"))
}

pub fn block_spec(
    id: &str,
    kind: &str,
    config_json: &str,
    view: Option<String>,
    z_order: Option<i32>,
) -> Result<BlockSpec, String> {
    let kind = EffectKind::from_str(kind).map_err(|e| e.to_string())?;
    let config = if config_json.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(config_json).map_err(|e| format!("block `{id}` config: {e}"))?
    };
    Ok(BlockSpec {
        id: id.to_string(),
        kind,
        config,
        view,
        z_order: z_order.unwrap_or(0),
    })
}

/// What an `init_surface` call does, given whether the app exists and
/// whether another call is still building it.
#[derive(Debug, Clone, PartialEq)]
enum InitStep<W> {
    Reuse,
    Wait(W),
    Build,
}

/// The one in-flight surface initialization, if any. `W` is what later
/// callers wait on.
struct InitGate<W> {
    pending: Option<W>,
}

impl<W: Clone> InitGate<W> {
    const fn new() -> Self {
        Self { pending: None }
    }

    fn step(&self, ready: bool) -> InitStep<W> {
        if ready {
            return InitStep::Reuse;
        }
        match &self.pending {
            Some(waiter) => InitStep::Wait(waiter.clone()),
            None => InitStep::Build,
        }
    }

    fn begin(&mut self, waiter: W) {
        self.pending = Some(waiter);
    }

    fn finish(&mut self) -> Option<W> {
        self.pending.take()
    }
}

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
    static INIT: RefCell<InitGate<js_sys::Promise>> = const { RefCell::new(InitGate::new()) };
}

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn with_app<R>(f: impl FnOnce(&mut App) -> Result<R, String>) -> Result<R, JsValue> {
    APP.with(|slot| match slot.borrow_mut().as_mut() {
        Some(app) => f(app).map_err(|e| JsValue::from_str(&e)),
        None => Err(JsValue::from_str("surface not initialized")),
    })
}

/// Decodes each queued image and hands the result back to the surface.
/// Loads whose owner unmounted meanwhile are dropped by the surface.
fn spawn_loads(surface: SharedSurface, loads: Vec<(ResourceId, String)>) {
    for (id, src) in loads {
        let surface = surface.clone();
        spawn_local(async move {
            let result = images::decode(&src).await;
            if let Err(reason) = &result {
                log(&format!("image load failed: {reason}"));
            }
            surface.complete_texture(id, result);
        });
    }
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

/// Creates the shared surface on `canvas_id`. A call made while a surface
/// is live keeps the existing one; a call made while another is still
/// creating it waits for that one instead of opening a second context.
#[wasm_bindgen]
pub async fn init_surface(canvas_id: String, config_json: String) -> Result<(), JsValue> {
    let ready = APP.with(|slot| slot.borrow().is_some());
    match INIT.with(|gate| gate.borrow().step(ready)) {
        InitStep::Reuse => {
            log("surface already initialized; reusing it");
            return Ok(());
        }
        InitStep::Wait(pending) => {
            log("surface initialization in progress; waiting for it");
            JsFuture::from(pending).await?;
            if APP.with(|slot| slot.borrow().is_none()) {
                return Err(JsValue::from_str("surface initialization failed"));
            }
            return Ok(());
        }
        InitStep::Build => {}
    }

    let mut settle: Option<js_sys::Function> = None;
    let pending = js_sys::Promise::new(&mut |resolve, _reject| settle = Some(resolve));
    INIT.with(|gate| gate.borrow_mut().begin(pending));
    let result = build_app(&canvas_id, &config_json).await;
    INIT.with(|gate| gate.borrow_mut().finish());
    // Waiters resolve either way and read the outcome from `APP`.
    if let Some(resolve) = settle {
        let _ = resolve.call0(&JsValue::NULL);
    }
    result
}

async fn build_app(canvas_id: &str, config_json: &str) -> Result<(), JsValue> {
    let config = stage_config(config_json).map_err(|e| JsValue::from_str(&e))?;
    let backend = init_backend(canvas_id).await?;
    let app = App::new(config, Box::new(backend)).map_err(|e| JsValue::from_str(&e))?;
    APP.with(|slot| *slot.borrow_mut() = Some(app));
    Ok(())
}

/// Drives one frame from the page's animation loop.
#[wasm_bindgen]
pub fn frame(timestamp_ms: f64) -> Result<(), JsValue> {
    let (surface, loads) = with_app(|app| {
        let loads = app.frame(Time::from_millis(timestamp_ms));
        Ok((app.stage().surface().clone(), loads))
    })?;
    if !loads.is_empty() {
        spawn_loads(surface, loads);
    }
    Ok(())
}

#[wasm_bindgen]
pub fn resize(width: f64, height: f64, pixel_ratio: f64) -> Result<(), JsValue> {
    with_app(|app| app.resize(width, height, pixel_ratio))
}

#[wasm_bindgen]
pub fn scroll() -> Result<(), JsValue> {
    with_app(|app| {
        app.stage().scroll();
        Ok(())
    })
}

#[wasm_bindgen]
pub fn pointer_move(x: f64, y: f64) -> Result<(), JsValue> {
    with_app(|app| {
        app.pointer_move(x, y);
        Ok(())
    })
}

/// Block under the pointer's last position, for hover wiring on the page.
#[wasm_bindgen]
pub fn hovered_block() -> Result<Option<String>, JsValue> {
    with_app(|app| Ok(app.hovered_block()))
}

#[wasm_bindgen]
pub fn pointer_down(x: f64, y: f64) -> Result<(), JsValue> {
    with_app(|app| {
        app.stage().pointer().pointer_down(x, y);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn pointer_up() -> Result<(), JsValue> {
    with_app(|app| {
        app.stage().pointer().pointer_up();
        Ok(())
    })
}

#[wasm_bindgen]
pub fn pointer_leave() -> Result<(), JsValue> {
    with_app(|app| {
        app.stage().pointer().pointer_leave();
        Ok(())
    })
}

/// Tracks `element` as view `id`. The page reports intersection changes
/// through [`view_intersecting`].
#[wasm_bindgen]
pub fn register_view(id: &str, element: web_sys::Element) -> Result<(), JsValue> {
    with_app(|app| app.register_view(id, ElementAnchor::new(element)))
}

#[wasm_bindgen]
pub fn unregister_view(id: &str) -> Result<bool, JsValue> {
    with_app(|app| Ok(app.unregister_view(id)))
}

#[wasm_bindgen]
pub fn view_intersecting(id: &str, intersecting: bool) -> Result<(), JsValue> {
    with_app(|app| app.set_view_intersecting(id, intersecting))
}

#[wasm_bindgen]
pub fn mount_block(
    id: &str,
    kind: &str,
    config_json: &str,
    view: Option<String>,
    z_order: Option<i32>,
) -> Result<(), JsValue> {
    let spec = block_spec(id, kind, config_json, view, z_order).map_err(|e| JsValue::from_str(&e))?;
    with_app(|app| app.mount_block(&spec))
}

#[wasm_bindgen]
pub fn mount_page(page_json: &str) -> Result<usize, JsValue> {
    let page: PageSpec = serde_json::from_str(page_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    with_app(|app| app.mount_page(&page))
}

/// Fetches a page description and mounts its blocks.
#[wasm_bindgen]
pub async fn load_page(url: String) -> Result<usize, JsValue> {
    let page = fetch_page(&url).await?;
    with_app(|app| app.mount_page(&page))
}

#[wasm_bindgen]
pub fn unmount_block(id: &str) -> Result<bool, JsValue> {
    with_app(|app| Ok(app.unmount_block(id)))
}

#[wasm_bindgen]
pub fn set_block_hover(id: &str, hovered: bool) -> Result<(), JsValue> {
    with_app(|app| app.set_block_hover(id, hovered))
}

#[wasm_bindgen]
pub fn carousel_next(id: &str) -> Result<(), JsValue> {
    with_app(|app| app.carousel(id)?.next().map_err(|e| e.to_string()))
}

#[wasm_bindgen]
pub fn carousel_prev(id: &str) -> Result<(), JsValue> {
    with_app(|app| app.carousel(id)?.prev().map_err(|e| e.to_string()))
}

#[wasm_bindgen]
pub fn carousel_go_to(id: &str, index: usize) -> Result<(), JsValue> {
    with_app(|app| app.carousel(id)?.go_to(index).map_err(|e| e.to_string()))
}

#[wasm_bindgen]
pub fn set_reduced_motion(reduced: bool) -> Result<(), JsValue> {
    with_app(|app| {
        app.stage().set_reduced_motion(reduced);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn stats_json() -> Result<String, JsValue> {
    with_app(|app| serde_json::to_string(&app.stats()).map_err(|e| e.to_string()))
}

async fn fetch_page(url: &str) -> Result<PageSpec, JsValue> {
    let resp = Request::get(url)
        .send()
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let text = resp
        .text()
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&e.to_string()))
}
