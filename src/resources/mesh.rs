//! Mesh data structures and generation

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    /// Calculate vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Calculate index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Calculate triangle count
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Merge `other` into this mesh
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    /// Move every vertex by `offset`
    pub fn translate(&mut self, offset: Vec3) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }

    /// Axis-aligned bounds, or None for an empty mesh
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            (min.min(v.position), max.max(v.position))
        }))
    }

    /// Append a flat triangle, wound counter-clockwise when seen from `normal`
    fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, normal: Vec3) {
        let (b, c) = if (b - a).cross(c - a).dot(normal) >= 0.0 {
            (b, c)
        } else {
            (c, b)
        };
        let base = self.vertices.len() as u32;
        self.vertices.extend([
            Vertex::new(a, normal),
            Vertex::new(b, normal),
            Vertex::new(c, normal),
        ]);
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    /// Append a flat quad given its corners in order around the edge
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        self.push_triangle(corners[0], corners[1], corners[2], normal);
        self.push_triangle(corners[0], corners[2], corners[3], normal);
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Self::box_between(Vec3::splat(-0.5), Vec3::splat(0.5));
        mesh.name = "cube".to_string();
        mesh
    }

    /// Create an axis-aligned box spanning `min` to `max`
    pub fn box_between(min: Vec3, max: Vec3) -> Self {
        let footprint = [
            Vec2::new(min.x, min.z),
            Vec2::new(max.x, min.z),
            Vec2::new(max.x, max.z),
            Vec2::new(min.x, max.z),
        ];
        let mut mesh = Self::prism(&footprint, min.y, max.y - min.y);
        mesh.name = "box".to_string();
        mesh
    }

    /// Extrude a convex footprint upward from `base_y` by `height`.
    ///
    /// Footprint points are `(x, z)` pairs; either winding is accepted.
    pub fn prism(footprint: &[Vec2], base_y: f32, height: f32) -> Self {
        let mut mesh = Mesh::new("prism");
        if footprint.len() < 3 {
            return mesh;
        }

        let signed_area: f32 = footprint
            .iter()
            .zip(footprint.iter().cycle().skip(1))
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum();
        let outward_sign = if signed_area >= 0.0 { 1.0 } else { -1.0 };

        let top_y = base_y + height;
        let at = |p: Vec2, y: f32| Vec3::new(p.x, y, p.y);

        // Sides
        for (a, b) in footprint.iter().zip(footprint.iter().cycle().skip(1)) {
            let edge = *b - *a;
            let Some(normal) = (Vec3::new(edge.y, 0.0, -edge.x) * outward_sign).try_normalize()
            else {
                continue;
            };
            mesh.push_quad(
                [at(*a, base_y), at(*b, base_y), at(*b, top_y), at(*a, top_y)],
                normal,
            );
        }

        // Caps
        let first = footprint[0];
        for pair in footprint[1..].windows(2) {
            mesh.push_triangle(at(first, top_y), at(pair[0], top_y), at(pair[1], top_y), Vec3::Y);
            mesh.push_triangle(
                at(first, base_y),
                at(pair[0], base_y),
                at(pair[1], base_y),
                Vec3::NEG_Y,
            );
        }

        mesh
    }

    /// Create a wall of `width` centred on the segment `start`–`end` in the
    /// XZ plane, rising from `base_y` by `height`. Returns None for a
    /// zero-length segment.
    pub fn wall_segment(start: Vec2, end: Vec2, width: f32, base_y: f32, height: f32) -> Option<Self> {
        let direction = (end - start).try_normalize()?;
        let offset = direction.perp() * (width / 2.0);
        let footprint = [start + offset, end + offset, end - offset, start - offset];
        let mut mesh = Self::prism(&footprint, base_y, height);
        mesh.name = "wall".to_string();
        Some(mesh)
    }
}
