//! Floor plan extrusion
//!
//! Turns 2D plan paths into wall, box and floor meshes. The plan's `y` axis
//! maps to world `z` and extrusion rises along world `+Y`. The result is
//! centred on the origin in `x` and `z`.

use crate::resources::{Material, Mesh};
use crate::scene::Scene;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Paths whose polyline is shorter than this are treated as stray strokes
pub const MIN_PATH_LENGTH: f32 = 10.0;

/// Thickness of the slab placed under the plan
pub const FLOOR_THICKNESS: f32 = 5.0;

/// Height of a box per unit of its `size` attribute
const BOX_HEIGHT_UNIT: f32 = 100.0;

#[derive(Error, Debug)]
pub enum FloorPlanError {
    #[error("floor plan is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("floor plan has no usable wall or box paths")]
    Empty,
    #[error("extrusion option '{name}' must be positive and finite, got {value}")]
    InvalidOption { name: &'static str, value: f32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    Wall,
    Box,
    Door,
}

/// One polyline of the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPath {
    #[serde(default)]
    pub kind: PathKind,
    pub points: Vec<[f32; 2]>,
    /// Box height in hundreds of scene units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
}

impl PlanPath {
    fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|pair| Vec2::from(pair[0]).distance(Vec2::from(pair[1])))
            .sum()
    }
}

/// Extrusion parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtrudeOptions {
    pub line_width: f32,
    pub wall_height: f32,
    pub scale: f32,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self {
            line_width: 10.0,
            wall_height: 300.0,
            scale: 1.0,
        }
    }
}

impl ExtrudeOptions {
    fn validate(&self) -> Result<(), FloorPlanError> {
        for (name, value) in [
            ("lineWidth", self.line_width),
            ("wallHeight", self.wall_height),
            ("scale", self.scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FloorPlanError::InvalidOption { name, value });
            }
        }
        Ok(())
    }
}

/// Parsed plan paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    pub paths: Vec<PlanPath>,
}

/// Meshes produced from a plan, already centred
#[derive(Debug, Clone)]
pub struct FloorPlanGeometry {
    pub walls: Mesh,
    pub boxes: Vec<Mesh>,
    pub floor: Mesh,
}

impl FloorPlanGeometry {
    /// Add every mesh to `scene` with the planner's material presets
    pub fn add_to_scene(self, scene: &mut Scene) {
        if !self.walls.vertices.is_empty() {
            scene.add_static_mesh(self.walls, Material::wall());
        }
        for mesh in self.boxes {
            scene.add_static_mesh(mesh, Material::storage_box());
        }
        scene.add_static_mesh(self.floor, Material::floor());
    }
}

impl FloorPlan {
    pub fn from_json(json: &str) -> Result<Self, FloorPlanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build_meshes(&self, options: &ExtrudeOptions) -> Result<FloorPlanGeometry, FloorPlanError> {
        options.validate()?;

        let mut walls = Mesh::new("walls");
        let mut boxes = Vec::new();

        for (index, path) in self.paths.iter().enumerate() {
            if path.points.len() < 2 || path.length() * options.scale < MIN_PATH_LENGTH {
                log::debug!("Skipping plan path {}: too short", index);
                continue;
            }
            let points: Vec<Vec2> = path
                .points
                .iter()
                .map(|p| Vec2::from(*p) * options.scale)
                .collect();

            match path.kind {
                PathKind::Wall => {
                    for pair in points.windows(2) {
                        if let Some(segment) = Mesh::wall_segment(
                            pair[0],
                            pair[1],
                            options.line_width,
                            0.0,
                            options.wall_height,
                        ) {
                            walls.append(&segment);
                        }
                    }
                }
                PathKind::Box => {
                    if points.len() < 3 {
                        log::warn!("Box path {} needs at least 3 points, got {}", index, points.len());
                        continue;
                    }
                    let corners = &points[..points.len().min(4)];
                    let height = path.size.unwrap_or(1.0) * BOX_HEIGHT_UNIT;
                    let mut mesh = Mesh::prism(corners, 0.0, height);
                    mesh.name = format!("box_{}", boxes.len());
                    boxes.push(mesh);
                }
                PathKind::Door => {
                    log::debug!("Door path {} ignored: cut-outs are not generated", index);
                }
            }
        }

        let (min, max) = std::iter::once(&walls)
            .chain(boxes.iter())
            .filter_map(Mesh::bounds)
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
            .ok_or(FloorPlanError::Empty)?;

        let center = (min + max) / 2.0;
        let offset = Vec3::new(-center.x, 0.0, -center.z);
        walls.translate(offset);
        for mesh in &mut boxes {
            mesh.translate(offset);
        }

        let half = (max - min) / 2.0;
        let mut floor = Mesh::box_between(
            Vec3::new(-half.x, min.y - FLOOR_THICKNESS, -half.z),
            Vec3::new(half.x, min.y, half.z),
        );
        floor.name = "floor".to_string();

        log::info!(
            "Floor plan extruded: {} wall triangles, {} boxes, footprint {:.0}x{:.0}",
            walls.triangle_count(),
            boxes.len(),
            max.x - min.x,
            max.z - min.z
        );

        Ok(FloorPlanGeometry {
            walls,
            boxes,
            floor,
        })
    }
}
