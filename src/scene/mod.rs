//! Scene management

mod camera;
mod camera_map;
mod cctv;
mod light;
mod transform;

pub use camera::*;
pub use camera_map::*;
pub use cctv::*;
pub use light::*;
pub use transform::*;

use crate::resources::{Material, Mesh};
use glam::Vec3;

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh_id: usize,
    pub material: Material,
    pub transform: Transform,
}

impl SceneObject {
    pub fn new(mesh_id: usize, material: Material) -> Self {
        Self {
            mesh_id,
            material,
            transform: Transform::default(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }
}

/// The scene containing all renderable content.
///
/// `revision` increases on every geometry change so GPU copies know when to
/// re-upload.
pub struct Scene {
    pub camera: Camera,
    pub lighting: SceneLighting,
    meshes: Vec<Mesh>,
    objects: Vec<SceneObject>,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            lighting: SceneLighting::default(),
            meshes: Vec::new(),
            objects: Vec::new(),
            revision: 0,
        }
    }

    /// Add a mesh and return its id
    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        let id = self.meshes.len();
        self.meshes.push(mesh);
        self.revision += 1;
        id
    }

    /// Add a render object to the scene
    pub fn add_object(&mut self, object: SceneObject) -> usize {
        let id = self.objects.len();
        self.objects.push(object);
        self.revision += 1;
        id
    }

    /// Add a mesh together with one object that draws it in place
    pub fn add_static_mesh(&mut self, mesh: Mesh, material: Material) -> usize {
        let mesh_id = self.add_mesh(mesh);
        self.add_object(SceneObject::new(mesh_id, material))
    }

    /// Drop all geometry, keeping the viewer camera and lighting
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.objects.clear();
        self.revision += 1;
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Axis-aligned bounds of all objects, or None for an empty scene
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for object in &self.objects {
            let Some(mesh) = self.meshes.get(object.mesh_id) else {
                continue;
            };
            let matrix = object.transform.matrix();
            for vertex in &mesh.vertices {
                let p = matrix.transform_point3(vertex.position);
                bounds = Some(match bounds {
                    Some((min, max)) => (min.min(p), max.max(p)),
                    None => (p, p),
                });
            }
        }
        bounds
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_tracks_geometry_changes() {
        let mut scene = Scene::new();
        let start = scene.revision();
        scene.add_static_mesh(Mesh::cube(), Material::wall());
        assert!(scene.revision() > start);

        let before_clear = scene.revision();
        scene.clear();
        assert!(scene.revision() > before_clear);
        assert!(scene.objects().is_empty());
    }

    #[test]
    fn test_bounds_follow_object_transform() {
        let mut scene = Scene::new();
        assert!(scene.bounds().is_none());

        let mesh_id = scene.add_mesh(Mesh::cube());
        scene.add_object(
            SceneObject::new(mesh_id, Material::storage_box()).with_position(Vec3::new(10.0, 0.0, 0.0)),
        );
        let (min, max) = scene.bounds().unwrap();
        assert_eq!(min, Vec3::new(9.5, -0.5, -0.5));
        assert_eq!(max, Vec3::new(10.5, 0.5, 0.5));
    }
}
