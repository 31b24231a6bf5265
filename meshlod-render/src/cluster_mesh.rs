//! Per-instance GPU buffers mirroring a live cut

use glam::Vec3;
use wgpu::util::DeviceExt;

use meshlod_core::ClusterDag;

/// CPU-side concatenation of a cut, ready for upload.
#[derive(Debug, Default, PartialEq)]
pub struct CutBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
}

impl CutBuffers {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Concatenate the vertex/normal/uv soup of every cluster in the cut,
/// in ascending cluster-id order, with positions offset by the instance
/// position.
pub fn assemble_cut_buffers<'a>(
    dag: &ClusterDag,
    cut: impl IntoIterator<Item = &'a u32>,
    position: Vec3,
) -> CutBuffers {
    let mut out = CutBuffers::default();
    let mut ids: Vec<u32> = cut.into_iter().copied().collect();
    ids.sort_unstable();

    for id in ids {
        let soup = &dag.positions[id as usize];
        out.positions.reserve(soup.len());
        for v in soup.chunks_exact(3) {
            out.positions.push(v[0] + position.x);
            out.positions.push(v[1] + position.y);
            out.positions.push(v[2] + position.z);
        }
        out.normals.extend_from_slice(&dag.normals[id as usize]);
        out.uvs.extend_from_slice(&dag.uvs[id as usize]);
    }
    out
}

struct GpuBuffers {
    positions: wgpu::Buffer,
    normals: wgpu::Buffer,
    uvs: wgpu::Buffer,
    position_capacity: u64,
    normal_capacity: u64,
    uv_capacity: u64,
}

/// Three equal-length vertex streams plus a triangle count for one
/// instance. The first upload allocates; later cuts reuse the
/// allocation while they fit and reallocate otherwise.
pub struct ClusterMesh {
    position: Vec3,
    buffers: Option<GpuBuffers>,
    vertex_count: u32,
}

impl ClusterMesh {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            buffers: None,
            vertex_count: 0,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn triangle_count(&self) -> u32 {
        self.vertex_count / 3
    }

    /// Upload the given cut. Call whenever the cut changes.
    pub fn set_cut<'a>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dag: &ClusterDag,
        cut: impl IntoIterator<Item = &'a u32>,
    ) {
        let cpu = assemble_cut_buffers(dag, cut, self.position);
        self.vertex_count = cpu.vertex_count() as u32;

        let pos_bytes: &[u8] = bytemuck::cast_slice(&cpu.positions);
        let norm_bytes: &[u8] = bytemuck::cast_slice(&cpu.normals);
        let uv_bytes: &[u8] = bytemuck::cast_slice(&cpu.uvs);

        let fits = self.buffers.as_ref().is_some_and(|b| {
            b.position_capacity >= pos_bytes.len() as u64
                && b.normal_capacity >= norm_bytes.len() as u64
                && b.uv_capacity >= uv_bytes.len() as u64
        });

        if fits {
            let buffers = self.buffers.as_ref().unwrap();
            queue.write_buffer(&buffers.positions, 0, pos_bytes);
            queue.write_buffer(&buffers.normals, 0, norm_bytes);
            queue.write_buffer(&buffers.uvs, 0, uv_bytes);
        } else {
            let make = |label: &str, bytes: &[u8]| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytes,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                })
            };
            self.buffers = Some(GpuBuffers {
                positions: make("cluster positions", pos_bytes),
                normals: make("cluster normals", norm_bytes),
                uvs: make("cluster uvs", uv_bytes),
                position_capacity: pos_bytes.len() as u64,
                normal_capacity: norm_bytes.len() as u64,
                uv_capacity: uv_bytes.len() as u64,
            });
        }
    }

    /// Bind the three streams and issue the triangle-list draw. The
    /// pipeline and texture bind groups are set by the caller.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        if self.vertex_count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, buffers.positions.slice(..));
        pass.set_vertex_buffer(1, buffers.normals.slice(..));
        pass.set_vertex_buffer(2, buffers.uvs.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::BoundingSphere;
    use std::collections::BTreeSet;

    fn soup_dag() -> ClusterDag {
        // Two leaves with distinct vertex data and a root.
        let parent_lists = vec![vec![2], vec![2], vec![]];
        let positions = vec![
            (0..9).map(|i| i as f32).collect::<Vec<_>>(),
            (9..18).map(|i| i as f32).collect::<Vec<_>>(),
            vec![0.5; 9],
        ];
        let normals = vec![vec![0.0; 9], vec![1.0; 9], vec![0.5; 9]];
        let uvs = vec![vec![0.1; 6], vec![0.2; 6], vec![0.3; 6]];
        let errors = vec![0.1, 0.1, 0.2];
        let spheres = vec![
            BoundingSphere {
                center: Vec3::ZERO,
                radius: 1.0,
            };
            3
        ];
        ClusterDag::new(&parent_lists, positions, normals, uvs, errors, &spheres)
    }

    #[test]
    fn concatenates_clusters_in_ascending_order() {
        let dag = soup_dag();
        let cut: BTreeSet<u32> = [1, 0].into_iter().collect();
        let bufs = assemble_cut_buffers(&dag, &cut, Vec3::ZERO);

        assert_eq!(bufs.vertex_count(), 6);
        assert_eq!(bufs.positions[0], 0.0);
        // Cluster 1 follows cluster 0 regardless of set insertion order.
        assert_eq!(bufs.positions[9], 9.0);
        assert_eq!(bufs.normals.len(), 18);
        assert_eq!(bufs.uvs.len(), 12);
        assert_eq!(bufs.normals[9], 1.0);
        assert_eq!(bufs.uvs[6], 0.2);
    }

    #[test]
    fn instance_position_offsets_positions_only() {
        let dag = soup_dag();
        let cut: BTreeSet<u32> = [0].into_iter().collect();
        let offset = Vec3::new(10.0, 20.0, 30.0);
        let bufs = assemble_cut_buffers(&dag, &cut, offset);

        assert_eq!(bufs.positions[0], 10.0);
        assert_eq!(bufs.positions[1], 21.0);
        assert_eq!(bufs.positions[2], 32.0);
        // Normals and uvs are untouched by the instance transform.
        assert_eq!(bufs.normals[0], 0.0);
        assert_eq!(bufs.uvs[0], 0.1);
    }

    #[test]
    fn empty_cut_yields_empty_buffers() {
        let dag = soup_dag();
        let cut: BTreeSet<u32> = BTreeSet::new();
        let bufs = assemble_cut_buffers(&dag, &cut, Vec3::ZERO);
        assert_eq!(bufs, CutBuffers::default());
    }
}
