//! Coverage shading program generation
//!
//! The program is regenerated for every camera capacity N. WGSL has no
//! indexable array of textures on the WebGPU and WebGL2 targets, so each
//! camera slot gets its own texture binding and the occlusion lookup is an
//! unrolled `switch` with one case per slot.

use super::layout::{CoverageLayout, COVERAGE_GROUP, UNIFORM_STRUCT};
use super::{CoverageError, CoverageResult};

/// Depth comparison bias in clip-space depth units
pub const SHADOW_BIAS: f32 = 1e-5;
/// Tint for surfaces seen by two or more cameras
pub const OVERLAP_TINT: [f32; 3] = [0.5, 0.0, 0.0];
/// Tint for surfaces seen by exactly one camera
pub const SINGLE_TINT: [f32; 3] = [0.5, 0.5, 0.0];
/// Hemisphere contribution on covered surfaces
pub const COVERED_HEMISPHERE_WEIGHT: f32 = 0.05;
/// Upper bound on N, the per-stage sampled texture limit of WebGPU and WebGL2
pub const MAX_CAMERA_SLOTS: u32 = 16;

fn wgsl_float(value: f32) -> String {
    format!("{:?}", value)
}

fn wgsl_vec3(value: [f32; 3]) -> String {
    format!(
        "vec3<f32>({}, {}, {})",
        wgsl_float(value[0]),
        wgsl_float(value[1]),
        wgsl_float(value[2])
    )
}

const COMMON_DECLARATIONS: &str = r#"
struct CameraUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world_pos = object.model * vec4<f32>(input.position, 1.0);
    output.world_position = world_pos.xyz;
    output.clip_position = camera.view_proj * world_pos;
    output.world_normal = normalize((object.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz);
    return output;
}

// Frustum test along the optical axis. The horizontal extent is the vertical
// one scaled by the aspect ratio.
fn in_camera_view(i: u32, p: vec3<f32>) -> bool {
    let origin = coverage.cctv_positions[i].xyz;
    let direction = normalize(coverage.cctv_directions[i].xyz);
    let frustum = coverage.cctv_frustums[i];
    let to_point = p - origin;
    let distance = dot(to_point, direction);
    if (distance < frustum.z || distance > frustum.w) {
        return false;
    }
    let half_height = distance * tan(radians(frustum.x) * 0.5);
    let half_width = half_height * frustum.y;
    let right = normalize(cross(direction, vec3<f32>(0.0, 1.0, 0.0)));
    let up = normalize(cross(right, direction));
    let lateral = to_point - direction * distance;
    return abs(dot(lateral, right)) <= half_width && abs(dot(lateral, up)) <= half_height;
}

fn is_occluded(depth_map: texture_2d<f32>, light_space: vec4<f32>) -> bool {
    let ndc = light_space.xyz / light_space.w;
    let uv = ndc.xy * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
    let closest = textureSampleLevel(depth_map, depth_sampler, uv, 0.0).r;
    return ndc.z - SHADOW_BIAS > closest;
}
"#;

const FRAGMENT_MAIN: &str = r#"
@fragment
fn fs_main(input: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {
    if (!front_facing) {
        discard;
    }

    let p = input.world_position;
    let normal = normalize(input.world_normal);

    var count = 0u;
    let active_count = min(coverage.cctv_count, CAMERA_CAPACITY);
    for (var i = 0u; i < active_count; i += 1u) {
        let to_camera = normalize(coverage.cctv_positions[i].xyz - p);
        if (dot(normal, to_camera) < 0.0) {
            continue;
        }
        if (!in_camera_view(i, p)) {
            continue;
        }
        if (coverage.cctv_positions[i].w > 0.5) {
            let light_space = coverage.shadow_matrices[i] * vec4<f32>(p, 1.0);
            if (sample_occlusion(i, light_space)) {
                continue;
            }
        }
        count += 1u;
    }

    let ambient = coverage.ambient_color.rgb;
    let directional = max(dot(normal, normalize(coverage.directional_direction.xyz)), 0.0)
        * coverage.directional_color.rgb;
    let hemisphere_factor = dot(normal, normalize(coverage.hemisphere_position.xyz - p));
    let hemisphere = mix(
        coverage.hemisphere_ground_color.rgb,
        coverage.hemisphere_sky_color.rgb,
        vec3<f32>(hemisphere_factor),
    );
    let covered_light = ambient + directional + COVERED_HEMISPHERE_WEIGHT * hemisphere;

    var color: vec3<f32>;
    if (count >= 2u) {
        color = covered_light * OVERLAP_TINT;
    } else if (count == 1u) {
        color = covered_light * SINGLE_TINT;
    } else {
        color = (ambient + directional + hemisphere) * object.base_color.rgb;
    }
    return vec4<f32>(color, 1.0);
}
"#;

/// Member of the coverage uniform struct as seen by the WGSL front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedMember {
    pub name: String,
    pub offset: u32,
    pub array_len: Option<u32>,
}

/// What the compiled program actually declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramReflection {
    pub members: Vec<ReflectedMember>,
    pub struct_size: u32,
    /// `(name, binding)` of every texture in the coverage group
    pub depth_maps: Vec<(String, u32)>,
}

/// Generated coverage shader for a fixed camera capacity
#[derive(Debug, Clone)]
pub struct CoverageProgram {
    layout: CoverageLayout,
    source: String,
}

impl CoverageProgram {
    /// Generate the program for `capacity` camera slots.
    ///
    /// Output depends only on `capacity`.
    pub fn generate(capacity: u32) -> CoverageResult<Self> {
        if capacity == 0 || capacity > MAX_CAMERA_SLOTS {
            return Err(CoverageError::InvalidCapacity {
                requested: capacity,
                max: MAX_CAMERA_SLOTS,
            });
        }

        let layout = CoverageLayout::new(capacity);
        let mut source = String::from("// Multi-camera coverage shading\n\n");
        source.push_str(&layout.wgsl_declarations());
        source.push_str(&format!(
            "\nconst CAMERA_CAPACITY: u32 = {}u;\n\
             const SHADOW_BIAS: f32 = {};\n\
             const OVERLAP_TINT: vec3<f32> = {};\n\
             const SINGLE_TINT: vec3<f32> = {};\n\
             const COVERED_HEMISPHERE_WEIGHT: f32 = {};\n",
            capacity,
            wgsl_float(SHADOW_BIAS),
            wgsl_vec3(OVERLAP_TINT),
            wgsl_vec3(SINGLE_TINT),
            wgsl_float(COVERED_HEMISPHERE_WEIGHT),
        ));
        source.push_str(COMMON_DECLARATIONS);
        source.push_str(&Self::occlusion_dispatch(&layout));
        source.push_str(FRAGMENT_MAIN);

        log::debug!(
            "Generated coverage program for {} cameras ({} bytes of uniforms)",
            capacity,
            layout.size()
        );

        Ok(Self { layout, source })
    }

    /// One `case` per slot, each reading its own texture binding
    fn occlusion_dispatch(layout: &CoverageLayout) -> String {
        let mut out = String::from(
            "\nfn sample_occlusion(i: u32, light_space: vec4<f32>) -> bool {\n    var occluded = false;\n    switch i {\n",
        );
        for (i, slot) in layout.depth_maps().iter().enumerate() {
            out.push_str(&format!(
                "        case {}u: {{\n            occluded = is_occluded({}, light_space);\n        }}\n",
                i, slot.name
            ));
        }
        out.push_str("        default: {}\n    }\n    return occluded;\n}\n");
        out
    }

    pub fn capacity(&self) -> u32 {
        self.layout.capacity()
    }

    pub fn layout(&self) -> &CoverageLayout {
        &self.layout
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compile the source with naga and check it against the layout
    pub fn validate(&self) -> CoverageResult<ProgramReflection> {
        let module = naga::front::wgsl::parse_str(&self.source)
            .map_err(|e| CoverageError::InvalidProgram(e.emit_to_string(&self.source)))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .map_err(|e| CoverageError::InvalidProgram(e.emit_to_string(&self.source)))?;

        let reflection = reflect(&module)?;
        self.check_reflection(&reflection)?;
        Ok(reflection)
    }

    fn check_reflection(&self, reflection: &ProgramReflection) -> CoverageResult<()> {
        let fields = self.layout.fields();
        if reflection.members.len() != fields.len() {
            return Err(CoverageError::InvalidProgram(format!(
                "uniform struct has {} members, layout has {}",
                reflection.members.len(),
                fields.len()
            )));
        }
        for (member, field) in reflection.members.iter().zip(fields) {
            if member.name != field.name
                || member.offset != field.offset
                || member.array_len != field.len
            {
                return Err(CoverageError::InvalidProgram(format!(
                    "member {} at offset {} (len {:?}) disagrees with layout {} at {} (len {:?})",
                    member.name,
                    member.offset,
                    member.array_len,
                    field.name,
                    field.offset,
                    field.len
                )));
            }
        }
        if reflection.struct_size != self.layout.size() {
            return Err(CoverageError::InvalidProgram(format!(
                "uniform struct is {} bytes, layout expects {}",
                reflection.struct_size,
                self.layout.size()
            )));
        }
        let expected: Vec<(String, u32)> = self
            .layout
            .depth_maps()
            .into_iter()
            .map(|slot| (slot.name, slot.binding))
            .collect();
        if reflection.depth_maps != expected {
            return Err(CoverageError::InvalidProgram(format!(
                "program binds {} depth maps, expected {}",
                reflection.depth_maps.len(),
                expected.len()
            )));
        }
        Ok(())
    }
}

fn reflect(module: &naga::Module) -> CoverageResult<ProgramReflection> {
    let mut members = None;
    let mut depth_maps = Vec::new();

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        if binding.group != COVERAGE_GROUP {
            continue;
        }
        match &module.types[global.ty].inner {
            naga::TypeInner::Struct {
                members: struct_members,
                span,
            } if module.types[global.ty].name.as_deref() == Some(UNIFORM_STRUCT) => {
                let reflected = struct_members
                    .iter()
                    .map(|member| ReflectedMember {
                        name: member.name.clone().unwrap_or_default(),
                        offset: member.offset,
                        array_len: match &module.types[member.ty].inner {
                            naga::TypeInner::Array {
                                size: naga::ArraySize::Constant(len),
                                ..
                            } => Some(len.get()),
                            _ => None,
                        },
                    })
                    .collect::<Vec<_>>();
                members = Some((reflected, *span));
            }
            naga::TypeInner::Image { .. } => {
                depth_maps.push((global.name.clone().unwrap_or_default(), binding.binding));
            }
            _ => {}
        }
    }

    let (members, struct_size) = members.ok_or_else(|| {
        CoverageError::InvalidProgram(format!("no {} binding in group {}", UNIFORM_STRUCT, COVERAGE_GROUP))
    })?;
    depth_maps.sort_by_key(|(_, binding)| *binding);

    Ok(ProgramReflection {
        members,
        struct_size,
        depth_maps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0)]
    #[case::over_limit(MAX_CAMERA_SLOTS + 1)]
    fn test_generate_rejects_capacity(#[case] capacity: u32) {
        assert!(matches!(
            CoverageProgram::generate(capacity),
            Err(CoverageError::InvalidCapacity { requested, .. }) if requested == capacity
        ));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = CoverageProgram::generate(5).unwrap();
        let b = CoverageProgram::generate(5).unwrap();
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn test_constants_are_embedded() {
        let program = CoverageProgram::generate(2).unwrap();
        assert!(program.source().contains("const CAMERA_CAPACITY: u32 = 2u;"));
        assert!(program.source().contains("const SHADOW_BIAS: f32 = 1e-5;"));
        assert!(program
            .source()
            .contains("const SINGLE_TINT: vec3<f32> = vec3<f32>(0.5, 0.5, 0.0);"));
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(MAX_CAMERA_SLOTS)]
    fn test_generated_program_validates(#[case] capacity: u32) {
        let program = CoverageProgram::generate(capacity).unwrap();
        let reflection = program.validate().unwrap();
        assert_eq!(reflection.depth_maps.len(), capacity as usize);
        assert_eq!(reflection.struct_size, program.layout().size());
    }

    #[test]
    fn test_every_capacity_parses_as_wgsl() {
        for capacity in 1..=MAX_CAMERA_SLOTS {
            let program = CoverageProgram::generate(capacity).unwrap();
            if let Err(e) = naga::front::wgsl::parse_str(program.source()) {
                panic!("N={}: {}", capacity, e.emit_to_string(program.source()));
            }
        }
    }

    #[test]
    fn test_reflection_mismatch_is_reported() {
        let program = CoverageProgram::generate(3).unwrap();
        let mut reflection = program.validate().unwrap();
        reflection.members[1].offset += 16;
        assert!(matches!(
            program.check_reflection(&reflection),
            Err(CoverageError::InvalidProgram(_))
        ));
    }
}
