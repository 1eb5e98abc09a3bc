//! Coverage viewer demo
//!
//! Run with:
//!   cargo run --example viewer
//!   cargo run --example viewer -- --plan plan.json --cameras cameras.json
//!
//! Controls:
//!   Tab      - Cycle edit mode
//!   P        - Print the camera map as JSON
//!   Delete   - Remove the most recently added camera
//!   +/-      - Change camera capacity
//!   Escape   - Exit

use cctv_planner::{
    editor::CctvMode, floorplan::ExtrudeOptions, scene::ProjectingCamera, PlannerConfig, Viewer,
    Window,
};
use clap::Parser;
use glam::Vec3;
use std::path::PathBuf;
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
};

/// A small office: outer walls, one partition and two storage boxes
const SAMPLE_PLAN: &str = r#"{"paths": [
    {"points": [[0, 0], [1200, 0], [1200, 800], [0, 800], [0, 0]]},
    {"points": [[600, 0], [600, 450]]},
    {"kind": "box", "points": [[200, 500], [400, 500], [400, 650], [200, 650]], "size": 1.5},
    {"kind": "box", "points": [[850, 150], [1000, 150], [1000, 300], [850, 300]], "size": 2}
]}"#;

#[derive(Parser, Debug)]
#[command(about = "Render CCTV coverage over a floor plan")]
struct Args {
    /// Floor plan JSON; a built-in sample is used when omitted
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Camera map JSON; two sample cameras are placed when omitted
    #[arg(long)]
    cameras: Option<PathBuf>,
    /// Camera slots in the coverage program
    #[arg(long, default_value_t = 4)]
    capacity: u32,
    /// Depth target size in texels
    #[arg(long, default_value_t = 2048)]
    depth_resolution: u32,
    /// Extruded wall height
    #[arg(long, default_value_t = 300.0)]
    wall_height: f32,
    #[arg(long)]
    no_vsync: bool,
}

fn next_mode(mode: CctvMode) -> CctvMode {
    let index = CctvMode::ALL.iter().position(|m| *m == mode).unwrap_or(0);
    CctvMode::ALL[(index + 1) % CctvMode::ALL.len()]
}

fn load_scene(viewer: &mut Viewer, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let plan = match &args.plan {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_PLAN.to_string(),
    };
    let options = ExtrudeOptions {
        wall_height: args.wall_height,
        ..Default::default()
    };
    viewer.load_floor_plan(&plan, &options)?;

    match &args.cameras {
        Some(path) => {
            let outcomes = viewer.load_camera_map(&std::fs::read_to_string(path)?)?;
            log::info!("Activated {} new cameras", outcomes.len());
        }
        None => {
            viewer.create_camera("entrance", Vec3::new(-550.0, 250.0, -350.0), Vec3::new(0.0, 0.0, 0.0))?;
            viewer.create_camera("storage", Vec3::new(550.0, 250.0, 350.0), Vec3::new(-300.0, 0.0, 0.0))?;
        }
    }
    Ok(())
}

fn handle_key(viewer: &mut Viewer, key: KeyCode) {
    match key {
        KeyCode::Tab => {
            let mode = next_mode(viewer.editor().mode());
            let selection = viewer.editor().selected_camera().map(str::to_string);
            if !viewer.set_mode(mode, selection.as_deref()) {
                // Not reachable from here; go through None first
                viewer.set_mode(CctvMode::None, None);
            }
        }
        KeyCode::KeyP => match viewer.export_camera_map().to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to export camera map: {}", e),
        },
        KeyCode::Delete => {
            let last = viewer
                .coverage()
                .cameras()
                .iter()
                .last()
                .map(|camera| camera.name().to_string());
            if let Some(name) = last {
                if let Err(e) = viewer.remove_camera(&name) {
                    log::error!("Failed to remove camera '{}': {}", name, e);
                }
            }
        }
        KeyCode::Equal | KeyCode::NumpadAdd => {
            let capacity = viewer.coverage().capacity() + 1;
            if let Err(e) = viewer.set_camera_capacity(capacity) {
                log::warn!("{}", e);
            }
        }
        KeyCode::Minus | KeyCode::NumpadSubtract => {
            let capacity = viewer.coverage().capacity().saturating_sub(1);
            if let Err(e) = viewer.set_camera_capacity(capacity) {
                log::warn!("{}", e);
            }
        }
        _ => {}
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = PlannerConfig {
        camera_capacity: args.capacity,
        depth_resolution: args.depth_resolution,
        vsync: !args.no_vsync,
        ..Default::default()
    };

    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let mut viewer = Viewer::new(window.window_arc(), config)?;
    load_scene(&mut viewer, &args)?;

    let camera = &viewer.scene().camera;
    log::info!(
        "Viewer camera at {:?} looking {:?}",
        camera.position,
        camera.view_direction()
    );

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(key),
                                state: ElementState::Pressed,
                                ..
                            },
                        ..
                    } => {
                        if key == KeyCode::Escape {
                            elwt.exit();
                        } else {
                            handle_key(&mut viewer, key);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if window.was_resized() {
                            let (width, height) = window.dimensions();
                            viewer.resize(width, height);
                            window.clear_resize_flag();
                        }
                        if let Err(e) = viewer.render() {
                            log::error!("Render failed: {}", e);
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                for event in viewer.drain_events() {
                    log::info!("{:?}", event);
                }
                window.request_redraw();
            }
            Event::LoopExiting => viewer.shutdown(),
            _ => {}
        }
    })?;
    Ok(())
}
