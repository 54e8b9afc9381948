//! Built-in meshes and the fixed-size mesh table.

use glam::{Vec2, Vec3};
use prism_core::entity::MeshId;
use wgpu::util::DeviceExt;

use crate::vertex::MeshVertex;

pub const MAX_MESHES: usize = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

/// One quad: `right x up == normal`, wound counter-clockwise seen from the
/// normal side.
fn push_face(mesh: &mut MeshData, normal: Vec3, right: Vec3, up: Vec3, uv_scale: f32) {
    let base = mesh.vertices.len() as u32;
    let center = normal * 0.5;
    let corners = [
        (center - right * 0.5 - up * 0.5, Vec2::new(0.0, 1.0)),
        (center + right * 0.5 - up * 0.5, Vec2::new(1.0, 1.0)),
        (center + right * 0.5 + up * 0.5, Vec2::new(1.0, 0.0)),
        (center - right * 0.5 + up * 0.5, Vec2::new(0.0, 0.0)),
    ];
    for (position, uv) in corners {
        mesh.vertices.push(MeshVertex {
            position: position.to_array(),
            tex_coords: (uv * uv_scale).to_array(),
            normal: normal.to_array(),
            ..MeshVertex::default()
        });
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Unit cube centered on the origin: 24 vertices, 36 indices.
pub fn unit_cube() -> MeshData {
    let mut mesh = MeshData::default();
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];
    for (normal, right, up) in faces {
        push_face(&mut mesh, normal, right, up, 1.0);
    }
    compute_tangents(&mut mesh);
    mesh
}

/// Unit plane in XZ facing +Y. `uv_scale` repeats the texture across it.
pub fn unit_plane(uv_scale: f32) -> MeshData {
    let mut mesh = MeshData::default();
    // The face helper offsets along the normal; the plane sits at y = 0.
    push_face(&mut mesh, Vec3::Y, Vec3::X, Vec3::NEG_Z, uv_scale);
    for v in &mut mesh.vertices {
        v.position[1] = 0.0;
    }
    compute_tangents(&mut mesh);
    mesh
}

/// Per-vertex tangent and bitangent from triangle UV gradients, averaged
/// over shared triangles and orthogonalized against the normal.
pub fn compute_tangents(mesh: &mut MeshData) {
    let mut tangents = vec![Vec3::ZERO; mesh.vertices.len()];
    let mut bitangents = vec![Vec3::ZERO; mesh.vertices.len()];

    for tri in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let p0 = Vec3::from(mesh.vertices[i0].position);
        let p1 = Vec3::from(mesh.vertices[i1].position);
        let p2 = Vec3::from(mesh.vertices[i2].position);
        let uv0 = Vec2::from(mesh.vertices[i0].tex_coords);
        let uv1 = Vec2::from(mesh.vertices[i1].tex_coords);
        let uv2 = Vec2::from(mesh.vertices[i2].tex_coords);

        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let d1 = uv1 - uv0;
        let d2 = uv2 - uv0;
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let t = (e1 * d2.y - e2 * d1.y) * r;
        let b = (e2 * d1.x - e1 * d2.x) * r;
        for i in [i0, i1, i2] {
            tangents[i] += t;
            bitangents[i] += b;
        }
    }

    for (i, v) in mesh.vertices.iter_mut().enumerate() {
        let n = Vec3::from(v.normal);
        let t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
        let b = bitangents[i].normalize_or_zero();
        v.tangent = t.to_array();
        v.bitangent = b.to_array();
    }
}

/// Mesh buffers plus the material bind group it is drawn with.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub material: wgpu::BindGroup,
    /// Material carries a real normal map.
    pub has_normal_map: bool,
}

impl GpuMesh {
    pub fn upload(
        device: &wgpu::Device,
        label: &str,
        data: &MeshData,
        material: wgpu::BindGroup,
        has_normal_map: bool,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            material,
            has_normal_map,
        }
    }

    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

/// Fixed-capacity mesh storage. Scene data is authored offline, so running
/// out of slots is a bug rather than a runtime condition.
pub struct MeshTable<M = GpuMesh> {
    meshes: Vec<M>,
    capacity: usize,
}

impl<M> MeshTable<M> {
    pub fn new() -> Self {
        Self::with_capacity(MAX_MESHES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            meshes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, mesh: M) -> MeshId {
        assert!(
            self.meshes.len() < self.capacity,
            "mesh table is full ({} meshes)",
            self.capacity
        );
        self.meshes.push(mesh);
        MeshId((self.meshes.len() - 1) as u32)
    }

    pub fn get(&self, id: MeshId) -> Option<&M> {
        self.meshes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.meshes.iter()
    }
}

impl<M> Default for MeshTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 3], b: Vec3) -> bool {
        (Vec3::from(a) - b).length() < 1e-5
    }

    #[test]
    fn cube_has_24_vertices_36_indices() {
        let cube = unit_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }

    #[test]
    fn cube_is_unit_sized_and_centered() {
        let cube = unit_cube();
        for v in &cube.vertices {
            for c in v.position {
                assert!((c.abs() - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn cube_triangles_wind_outward() {
        let cube = unit_cube();
        for tri in cube.indices.chunks_exact(3) {
            let p: Vec<Vec3> = tri
                .iter()
                .map(|&i| Vec3::from(cube.vertices[i as usize].position))
                .collect();
            let face_normal = (p[1] - p[0]).cross(p[2] - p[0]).normalize();
            let n = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(n) > 0.99);
        }
    }

    #[test]
    fn front_face_tangent_follows_u() {
        let cube = unit_cube();
        // First face is +Z with u running along +X and v running down +Y.
        assert!(approx(cube.vertices[0].tangent, Vec3::X));
        assert!(approx(cube.vertices[0].bitangent, Vec3::NEG_Y));
    }

    #[test]
    fn tangent_frame_is_orthonormal() {
        for mesh in [unit_cube(), unit_plane(4.0)] {
            for v in &mesh.vertices {
                let n = Vec3::from(v.normal);
                let t = Vec3::from(v.tangent);
                let b = Vec3::from(v.bitangent);
                assert!((t.length() - 1.0).abs() < 1e-5);
                assert!((b.length() - 1.0).abs() < 1e-5);
                assert!(n.dot(t).abs() < 1e-5);
                assert!(n.dot(b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn plane_scales_texture_coordinates() {
        let plane = unit_plane(10.0);
        assert_eq!(plane.vertices.len(), 4);
        assert_eq!(plane.indices.len(), 6);
        let max_u = plane
            .vertices
            .iter()
            .map(|v| v.tex_coords[0])
            .fold(f32::MIN, f32::max);
        assert!((max_u - 10.0).abs() < 1e-6);
        assert!(plane.vertices.iter().all(|v| v.position[1] == 0.0));
        assert!(plane.vertices.iter().all(|v| approx(v.normal, Vec3::Y)));
    }

    #[test]
    fn mesh_ids_are_sequential() {
        let mut table: MeshTable<&str> = MeshTable::with_capacity(3);
        assert_eq!(table.insert("cube"), MeshId(0));
        assert_eq!(table.insert("plane"), MeshId(1));
        assert_eq!(table.get(MeshId(1)), Some(&"plane"));
        assert_eq!(table.get(MeshId(2)), None);
    }

    #[test]
    #[should_panic(expected = "mesh table is full")]
    fn full_table_asserts() {
        let mut table: MeshTable<u8> = MeshTable::with_capacity(2);
        table.insert(0);
        table.insert(1);
        table.insert(2);
    }
}
