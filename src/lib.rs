//! CCTV Planner - multi-camera coverage rendering for facility layouts
//!
//! Surfaces of an extruded floor plan are shaded by how many surveillance
//! cameras see them, with occlusion resolved through one depth target per
//! camera. Runs on wgpu, natively and in the browser (WebGPU or WebGL2).
//!
//! # Features
//! - Virtual cameras derived from real lens and sensor parameters
//! - Coverage shading program generated for a configurable camera count
//! - Per-camera depth passes feeding a single coverage pass
//! - Floor plan extrusion and camera map import/export
//! - Edit-mode model and event queue for a host UI

pub mod backend;
pub mod coverage;
pub mod editor;
pub mod floorplan;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod viewer;
pub mod window;

// Web-specific modules
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use viewer::{Viewer, ViewerError, ViewerResult};
pub use window::Window;

// Re-export wgpu backend for direct access
pub use backend::wgpu_backend::WgpuBackend;

use scene::OpticalSettings;

/// Configuration for initializing the viewer
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Camera slots in the coverage program
    pub camera_capacity: u32,
    /// Width and height of every camera's depth target
    pub depth_resolution: u32,
    /// Optics given to new cameras and to camera-map entries
    pub optics: OpticalSettings,
    pub clear_color: [f32; 4],
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            title: "CCTV Planner".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            camera_capacity: 4,
            depth_resolution: 2048,
            optics: OpticalSettings::default(),
            clear_color: [0.1, 0.1, 0.12, 1.0],
        }
    }
}

// Web initialization helper
#[cfg(target_arch = "wasm32")]
pub fn init_web_logging() {
    // Set up panic hook for better error messages in console
    console_error_panic_hook::set_once();
    // A logger may already be installed by the host page
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&format!("Logger not installed: {}", e).into());
    }
}
