//! Vertex buffers and vertex arrays.
//!
//! Every attribute channel of a [`Geometry`] gets one device buffer, plus one
//! for the index. When [`Geometry::version`] moves, only the channels whose own
//! version moved are re-uploaded; groups and draw ranges never touch buffers.
//! Vertex arrays are per `(geometry, program)`: attribute locations belong to
//! the program, so the same geometry drawn with two programs needs two
//! bindings. A layout change (attribute added or removed) drops them all.

use rustc_hash::FxHashMap;
use slotmap::SparseSecondaryMap;
use smallvec::SmallVec;

use crate::assets::GeometryHandle;
use crate::renderer::device::{BufferData, BufferId, GpuDevice, ProgramId, VertexArrayId};
use crate::renderer::state::StateTracker;
use crate::resources::geometry::Geometry;

#[derive(Debug, Clone, Copy)]
struct VertexArray {
    program: ProgramId,
    vao: VertexArrayId,
    version: u64,
}

#[derive(Debug, Clone, Copy)]
struct GpuBuffer {
    buffer: BufferId,
    item_size: u32,
    normalized: bool,
    /// Channel version of the uploaded data
    version: u64,
}

#[derive(Debug, Default)]
struct GpuGeometry {
    version: u64,
    layout_version: u64,
    buffers: FxHashMap<String, GpuBuffer>,
    index: Option<GpuBuffer>,
    vertex_arrays: SmallVec<[VertexArray; 2]>,
}

#[derive(Debug, Default)]
pub struct GeometryManager {
    geometries: SparseSecondaryMap<GeometryHandle, GpuGeometry>,
    uploads: u64,
    buffer_uploads: u64,
}

impl GeometryManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the channels of the geometry whose version moved since the
    /// last call.
    pub fn prepare<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        handle: GeometryHandle,
        geometry: &Geometry,
    ) {
        if !self.geometries.contains_key(handle) {
            self.geometries.insert(handle, GpuGeometry {
                version: u64::MAX,
                layout_version: u64::MAX,
                ..GpuGeometry::default()
            });
        }
        let Some(gpu) = self.geometries.get_mut(handle) else {
            return;
        };
        if gpu.version == geometry.version() {
            return;
        }

        if gpu.layout_version != geometry.layout_version() {
            for va in gpu.vertex_arrays.drain(..) {
                tracker.forget_vertex_array(va.vao);
                tracker.device_mut().delete_vertex_array(va.vao);
            }
            gpu.buffers.retain(|name, gpu_buffer| {
                let keep = geometry.attribute(name).is_some();
                if !keep {
                    tracker.device_mut().delete_buffer(gpu_buffer.buffer);
                }
                keep
            });
            gpu.layout_version = geometry.layout_version();
        }

        let device = tracker.device_mut();
        let mut uploaded = 0;
        for (name, attribute) in geometry.attributes() {
            let version = geometry.attribute_version(name).unwrap_or_default();
            let entry = gpu
                .buffers
                .entry(name.to_string())
                .or_insert_with(|| GpuBuffer {
                    buffer: device.create_buffer(),
                    item_size: 0,
                    normalized: false,
                    version: u64::MAX,
                });
            entry.item_size = attribute.item_size;
            entry.normalized = attribute.normalized;
            if entry.version != version {
                device.upload_buffer(entry.buffer, BufferData::Vertex(&attribute.data));
                entry.version = version;
                uploaded += 1;
            }
        }
        let index_version = geometry.index_version();
        match geometry.index() {
            Some(indices) => {
                if let Some(gpu_index) = gpu.index.as_mut() {
                    if gpu_index.version != index_version {
                        device.upload_buffer(gpu_index.buffer, BufferData::Index(indices));
                        gpu_index.version = index_version;
                        uploaded += 1;
                    }
                } else {
                    let buffer = device.create_buffer();
                    device.upload_buffer(buffer, BufferData::Index(indices));
                    gpu.index = Some(GpuBuffer {
                        buffer,
                        item_size: 1,
                        normalized: false,
                        version: index_version,
                    });
                    uploaded += 1;
                }
            }
            None => {
                if let Some(gpu_index) = gpu.index.take() {
                    device.delete_buffer(gpu_index.buffer);
                }
            }
        }

        gpu.version = geometry.version();
        self.uploads += 1;
        self.buffer_uploads += uploaded;
        log::trace!("uploaded geometry '{}' v{}", geometry.name, geometry.version());
    }

    /// Binds the vertex array for `(handle, program)`, building it on first
    /// use. Returns whether the geometry is indexed.
    pub fn bind<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        handle: GeometryHandle,
        program: ProgramId,
    ) -> bool {
        let Some(gpu) = self.geometries.get_mut(handle) else {
            tracker.bind_vertex_array(None);
            return false;
        };
        let indexed = gpu.index.is_some();
        let index_buffer = gpu.index.map(|i| i.buffer);

        if let Some(va) = gpu
            .vertex_arrays
            .iter()
            .find(|va| va.program == program && va.version == gpu.layout_version)
        {
            tracker.bind_vertex_array(Some(va.vao));
            return indexed;
        }

        let vao = tracker.device_mut().create_vertex_array();
        tracker.bind_vertex_array(Some(vao));
        let device = tracker.device_mut();
        for (name, b) in &gpu.buffers {
            if let Some(location) = device.attribute_location(program, name) {
                device.vertex_attrib(location, b.buffer, b.item_size, b.normalized);
            }
        }
        device.bind_index_buffer(index_buffer);

        gpu.vertex_arrays.retain(|va| va.program != program);
        gpu.vertex_arrays.push(VertexArray {
            program,
            vao,
            version: gpu.layout_version,
        });
        indexed
    }

    /// Drops vertex arrays built for a destroyed program.
    pub fn forget_program<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, program: ProgramId) {
        for (_, gpu) in self.geometries.iter_mut() {
            gpu.vertex_arrays.retain(|va| {
                if va.program == program {
                    tracker.forget_vertex_array(va.vao);
                    tracker.device_mut().delete_vertex_array(va.vao);
                    false
                } else {
                    true
                }
            });
        }
    }

    /// Deletes every device object of `handle`.
    pub fn dispose<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, handle: GeometryHandle) {
        let Some(gpu) = self.geometries.remove(handle) else {
            return;
        };
        for va in gpu.vertex_arrays {
            tracker.forget_vertex_array(va.vao);
            tracker.device_mut().delete_vertex_array(va.vao);
        }
        let device = tracker.device_mut();
        for b in gpu.buffers.into_values() {
            device.delete_buffer(b.buffer);
        }
        if let Some(index) = gpu.index {
            device.delete_buffer(index.buffer);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Geometry passes that found a version change.
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Individual vertex and index buffer uploads.
    #[must_use]
    pub fn buffer_uploads(&self) -> u64 {
        self.buffer_uploads
    }
}
