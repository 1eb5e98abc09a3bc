//! Web-specific functionality for running the viewer in a browser.
//!
//! `start` creates the canvas and the viewer, then hands JavaScript a
//! `WebViewer` handle for loading inputs, editing cameras and polling events.

use crate::editor::CctvMode;
use crate::floorplan::ExtrudeOptions;
use crate::window::PendingResize;
use crate::{init_web_logging, PlannerConfig, Viewer};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use wasm_bindgen::prelude::*;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::web::{EventLoopExtWebSys, WindowExtWebSys};
use winit::window::WindowBuilder;

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// Get the browser window dimensions
pub fn get_window_size() -> (u32, u32) {
    let size = web_sys::window().and_then(|window| {
        let width = window.inner_width().ok()?.as_f64()?;
        let height = window.inner_height().ok()?.as_f64()?;
        Some((width as u32, height as u32))
    });
    let (width, height) = size.unwrap_or((800, 600));
    (width.max(100), height.max(100))
}

/// Put the window's canvas into the element `container_id` (or the body)
/// and size it to the browser window
pub fn setup_canvas(
    window: &winit::window::Window,
    container_id: &str,
) -> Result<web_sys::HtmlCanvasElement, JsValue> {
    let canvas = window
        .canvas()
        .ok_or_else(|| js_error("window has no canvas"))?;

    let web_window = web_sys::window().ok_or_else(|| js_error("no global window exists"))?;
    let document = web_window
        .document()
        .ok_or_else(|| js_error("no document exists"))?;

    let container: web_sys::Element = match document.get_element_by_id(container_id) {
        Some(element) => element,
        None => document
            .body()
            .ok_or_else(|| js_error("document has no body"))?
            .into(),
    };
    container.append_child(&canvas)?;

    // Get device pixel ratio for proper scaling
    let dpr = web_window.device_pixel_ratio();
    let (css_width, css_height) = get_window_size();

    let canvas_width = (css_width as f64 * dpr) as u32;
    let canvas_height = (css_height as f64 * dpr) as u32;
    canvas.set_width(canvas_width);
    canvas.set_height(canvas_height);

    let style = canvas.style();
    style.set_property("width", &format!("{}px", css_width))?;
    style.set_property("height", &format!("{}px", css_height))?;
    style.set_property("display", "block")?;

    log::info!(
        "Canvas setup: {}x{} (CSS: {}x{}, DPR: {})",
        canvas_width,
        canvas_height,
        css_width,
        css_height,
        dpr
    );

    Ok(canvas)
}

/// Spawn a future on the browser's event loop
pub fn spawn_local<F>(future: F)
where
    F: std::future::Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Log a message to the browser console
#[wasm_bindgen]
pub fn console_log(msg: &str) {
    web_sys::console::log_1(&msg.into());
}

/// Log an error to the browser console
#[wasm_bindgen]
pub fn console_error(msg: &str) {
    web_sys::console::error_1(&msg.into());
}

/// JavaScript handle to a running viewer
#[wasm_bindgen]
pub struct WebViewer {
    viewer: Rc<RefCell<Viewer>>,
}

#[wasm_bindgen]
impl WebViewer {
    /// Replace the scene with a floor plan. `options` is optional JSON
    /// extrusion settings.
    #[wasm_bindgen(js_name = loadFloorPlan)]
    pub fn load_floor_plan(&self, plan: &str, options: Option<String>) -> Result<(), JsValue> {
        let options = match options {
            Some(json) => serde_json::from_str(&json).map_err(js_error)?,
            None => ExtrudeOptions::default(),
        };
        self.viewer
            .borrow_mut()
            .load_floor_plan(plan, &options)
            .map_err(js_error)
    }

    /// Activate the cameras of a saved map. Returns how many were added
    /// without a depth target.
    #[wasm_bindgen(js_name = loadCameraMap)]
    pub fn load_camera_map(&self, json: &str) -> Result<u32, JsValue> {
        let outcomes = self
            .viewer
            .borrow_mut()
            .load_camera_map(json)
            .map_err(js_error)?;
        Ok(outcomes
            .iter()
            .filter(|outcome| !matches!(outcome, crate::coverage::AddOutcome::Added { .. }))
            .count() as u32)
    }

    #[wasm_bindgen(js_name = exportCameraMap)]
    pub fn export_camera_map(&self) -> Result<String, JsValue> {
        self.viewer
            .borrow()
            .export_camera_map()
            .to_json()
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = createCamera)]
    pub fn create_camera(&self, name: &str, position: &[f32], target: &[f32]) -> Result<(), JsValue> {
        let position = vec3_from(position)?;
        let target = vec3_from(target)?;
        self.viewer
            .borrow_mut()
            .create_camera(name, position, target)
            .map(|_| ())
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = removeCamera)]
    pub fn remove_camera(&self, name: &str) -> Result<(), JsValue> {
        self.viewer
            .borrow_mut()
            .remove_camera(name)
            .map(|_| ())
            .map_err(js_error)
    }

    /// Request a mode change by its host name (`"add"`, `"lookat"`, ...)
    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&self, mode: &str, selection: Option<String>) -> Result<bool, JsValue> {
        let mode: CctvMode =
            serde_json::from_value(serde_json::Value::String(mode.to_string())).map_err(js_error)?;
        Ok(self
            .viewer
            .borrow_mut()
            .set_mode(mode, selection.as_deref()))
    }

    /// Queued events as a JSON array
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&self) -> Result<String, JsValue> {
        let events = self.viewer.borrow_mut().drain_events();
        serde_json::to_string(&events).map_err(js_error)
    }
}

fn vec3_from(values: &[f32]) -> Result<glam::Vec3, JsValue> {
    match values {
        [x, y, z] => Ok(glam::Vec3::new(*x, *y, *z)),
        _ => Err(js_error(format!("expected 3 components, got {}", values.len()))),
    }
}

/// Create the viewer inside `container_id` and start rendering
#[wasm_bindgen]
pub async fn start(container_id: String) -> Result<WebViewer, JsValue> {
    init_web_logging();

    let event_loop = EventLoop::new().map_err(js_error)?;
    let (width, height) = get_window_size();
    let config = PlannerConfig {
        width,
        height,
        ..Default::default()
    };

    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)
            .map_err(js_error)?,
    );
    let canvas = setup_canvas(&window, &container_id)?;

    let mut viewer = Viewer::new_async(Arc::clone(&window), config)
        .await
        .map_err(js_error)?;
    viewer.resize(canvas.width(), canvas.height());

    let viewer = Rc::new(RefCell::new(viewer));
    let looped = Rc::clone(&viewer);
    let pending = Cell::new(PendingResize::default());

    log::info!("Starting render loop");
    event_loop.spawn(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        // JavaScript may hold the viewer while the loop fires
        let Ok(mut viewer) = looped.try_borrow_mut() else {
            if let Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } = event
            {
                log::debug!("Viewer busy, deferring resize to {}x{}", size.width, size.height);
                let mut latest = pending.get();
                latest.record(size.width, size.height);
                pending.set(latest);
            }
            return;
        };

        let mut latest = pending.get();
        if let Some((width, height)) = latest.take() {
            viewer.resize(width, height);
        }
        pending.set(latest);

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
                WindowEvent::RedrawRequested => {
                    if let Err(e) = viewer.render() {
                        log::error!("Render failed: {}", e);
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    });

    Ok(WebViewer { viewer })
}
