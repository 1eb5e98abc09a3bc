//! Uniform and binding layout of the coverage program
//!
//! The layout is computed once per camera capacity and is the single source
//! of truth for both the WGSL declarations and the byte offsets the uniform
//! synchronizer writes to.

/// Bind group index of the coverage resources
pub const COVERAGE_GROUP: u32 = 2;
pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;
/// Depth map of camera slot `i` lives at `FIRST_DEPTH_MAP_BINDING + i`
pub const FIRST_DEPTH_MAP_BINDING: u32 = 2;

/// Name of the WGSL struct holding the coverage uniforms
pub const UNIFORM_STRUCT: &str = "CoverageUniforms";

/// WGSL types used in the coverage uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Vec4,
    Mat4,
    U32,
}

impl UniformType {
    pub fn wgsl(&self) -> &'static str {
        match self {
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
            UniformType::U32 => "u32",
        }
    }

    /// Alignment in the uniform address space
    pub fn align(&self) -> u32 {
        match self {
            UniformType::Vec4 | UniformType::Mat4 => 16,
            UniformType::U32 => 4,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
            UniformType::U32 => 4,
        }
    }
}

/// One member of the coverage uniform struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub ty: UniformType,
    /// Array length, None for a scalar member
    pub len: Option<u32>,
    /// Byte offset from the start of the struct
    pub offset: u32,
}

impl UniformField {
    /// Byte distance between consecutive array elements
    pub fn stride(&self) -> u32 {
        self.ty.size()
    }

    pub fn size(&self) -> u32 {
        self.stride() * self.len.unwrap_or(1)
    }

    /// Byte offset of array element `index`
    pub fn element_offset(&self, index: u32) -> u32 {
        self.offset + index * self.stride()
    }

    pub fn wgsl_type(&self) -> String {
        match self.len {
            Some(len) => format!("array<{}, {}>", self.ty.wgsl(), len),
            None => self.ty.wgsl().to_string(),
        }
    }
}

/// Texture binding for the depth map of one camera slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMapSlot {
    pub name: String,
    pub binding: u32,
}

struct OffsetCursor {
    offset: u32,
}

impl OffsetCursor {
    fn place(&mut self, name: &'static str, ty: UniformType, len: Option<u32>) -> UniformField {
        let align = ty.align();
        let offset = self.offset.div_ceil(align) * align;
        let field = UniformField {
            name,
            ty,
            len,
            offset,
        };
        self.offset = offset + field.size();
        field
    }
}

/// Field offsets of the coverage uniform block for a fixed camera capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageLayout {
    capacity: u32,
    /// xyz position, w = 1 when the slot has a depth map
    pub cctv_positions: UniformField,
    pub cctv_directions: UniformField,
    /// fov_y in degrees, aspect, near, far
    pub cctv_frustums: UniformField,
    pub shadow_matrices: UniformField,
    pub ambient_color: UniformField,
    pub directional_color: UniformField,
    pub directional_direction: UniformField,
    pub hemisphere_sky_color: UniformField,
    pub hemisphere_ground_color: UniformField,
    pub hemisphere_position: UniformField,
    pub cctv_count: UniformField,
    size: u32,
}

impl CoverageLayout {
    pub fn new(capacity: u32) -> Self {
        let n = Some(capacity);
        let mut cursor = OffsetCursor { offset: 0 };
        let cctv_positions = cursor.place("cctv_positions", UniformType::Vec4, n);
        let cctv_directions = cursor.place("cctv_directions", UniformType::Vec4, n);
        let cctv_frustums = cursor.place("cctv_frustums", UniformType::Vec4, n);
        let shadow_matrices = cursor.place("shadow_matrices", UniformType::Mat4, n);
        let ambient_color = cursor.place("ambient_color", UniformType::Vec4, None);
        let directional_color = cursor.place("directional_color", UniformType::Vec4, None);
        let directional_direction = cursor.place("directional_direction", UniformType::Vec4, None);
        let hemisphere_sky_color = cursor.place("hemisphere_sky_color", UniformType::Vec4, None);
        let hemisphere_ground_color =
            cursor.place("hemisphere_ground_color", UniformType::Vec4, None);
        let hemisphere_position = cursor.place("hemisphere_position", UniformType::Vec4, None);
        let cctv_count = cursor.place("cctv_count", UniformType::U32, None);

        // Struct size rounds up to the struct alignment
        let size = cursor.offset.div_ceil(16) * 16;

        Self {
            capacity,
            cctv_positions,
            cctv_directions,
            cctv_frustums,
            shadow_matrices,
            ambient_color,
            directional_color,
            directional_direction,
            hemisphere_sky_color,
            hemisphere_ground_color,
            hemisphere_position,
            cctv_count,
            size,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Size of the uniform buffer in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// All members in declaration order
    pub fn fields(&self) -> [&UniformField; 11] {
        [
            &self.cctv_positions,
            &self.cctv_directions,
            &self.cctv_frustums,
            &self.shadow_matrices,
            &self.ambient_color,
            &self.directional_color,
            &self.directional_direction,
            &self.hemisphere_sky_color,
            &self.hemisphere_ground_color,
            &self.hemisphere_position,
            &self.cctv_count,
        ]
    }

    /// Lighting members in the order `SceneLighting::uniform_values` yields
    pub fn lighting_fields(&self) -> [&UniformField; 6] {
        [
            &self.ambient_color,
            &self.directional_color,
            &self.directional_direction,
            &self.hemisphere_sky_color,
            &self.hemisphere_ground_color,
            &self.hemisphere_position,
        ]
    }

    /// Byte range covering the per-camera arrays
    pub fn camera_region(&self) -> std::ops::Range<u32> {
        self.cctv_positions.offset..self.shadow_matrices.offset + self.shadow_matrices.size()
    }

    /// Byte range covering the lighting members
    pub fn lighting_region(&self) -> std::ops::Range<u32> {
        self.ambient_color.offset
            ..self.hemisphere_position.offset + self.hemisphere_position.size()
    }

    pub fn depth_maps(&self) -> Vec<DepthMapSlot> {
        (0..self.capacity)
            .map(|i| DepthMapSlot {
                name: format!("shadow_map_{}", i),
                binding: FIRST_DEPTH_MAP_BINDING + i,
            })
            .collect()
    }

    /// Number of entries in the coverage bind group
    pub fn binding_count(&self) -> u32 {
        FIRST_DEPTH_MAP_BINDING + self.capacity
    }

    /// WGSL struct and resource declarations for this layout
    pub fn wgsl_declarations(&self) -> String {
        let mut out = format!("struct {} {{\n", UNIFORM_STRUCT);
        for field in self.fields() {
            out.push_str(&format!("    {}: {},\n", field.name, field.wgsl_type()));
        }
        out.push_str("}\n\n");
        out.push_str(&format!(
            "@group({}) @binding({}) var<uniform> coverage: {};\n",
            COVERAGE_GROUP, UNIFORM_BINDING, UNIFORM_STRUCT
        ));
        out.push_str(&format!(
            "@group({}) @binding({}) var depth_sampler: sampler;\n",
            COVERAGE_GROUP, SAMPLER_BINDING
        ));
        for slot in self.depth_maps() {
            out.push_str(&format!(
                "@group({}) @binding({}) var {}: texture_2d<f32>;\n",
                COVERAGE_GROUP, slot.binding, slot.name
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_aligned_and_contiguous() {
        let layout = CoverageLayout::new(4);
        assert_eq!(layout.cctv_positions.offset, 0);
        assert_eq!(layout.cctv_directions.offset, 64);
        assert_eq!(layout.cctv_frustums.offset, 128);
        assert_eq!(layout.shadow_matrices.offset, 192);
        assert_eq!(layout.ambient_color.offset, 192 + 4 * 64);
        assert_eq!(layout.cctv_count.offset, 448 + 6 * 16);
        assert_eq!(layout.size(), 560);
    }

    #[test]
    fn test_depth_map_bindings_follow_uniforms() {
        let layout = CoverageLayout::new(3);
        let slots = layout.depth_maps();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].name, "shadow_map_0");
        assert_eq!(slots[2].binding, FIRST_DEPTH_MAP_BINDING + 2);
        assert_eq!(layout.binding_count(), 5);
    }

    #[test]
    fn test_declarations_size_arrays_by_capacity() {
        let wgsl = CoverageLayout::new(6).wgsl_declarations();
        assert!(wgsl.contains("cctv_positions: array<vec4<f32>, 6>"));
        assert!(wgsl.contains("shadow_matrices: array<mat4x4<f32>, 6>"));
        assert!(wgsl.contains("var shadow_map_5: texture_2d<f32>;"));
        assert!(!wgsl.contains("shadow_map_6"));
    }
}
