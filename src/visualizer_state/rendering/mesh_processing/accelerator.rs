//! Accelerator strategy: the coordinate remap as one compute dispatch.
//!
//! The buffer contract is fixed: the records are uploaded as one contiguous
//! buffer of seven-float `VertexRecord`s, the `CSMain` kernel remaps every
//! position in place with `ceil(n / 256)` work-groups, and the same buffer is
//! downloaded again. From the scheduler's point of view the round trip is a
//! synchronous call.

use std::{
    num::NonZeroU64,
    path::{Path, PathBuf},
    sync::mpsc,
};

use log::{debug, info};
use thiserror::Error;
use wgpu::{BufferUsages, ComputePipeline, Device, Queue};

use super::buffer_state::BufferState;
use crate::visualizer_state::rendering::vertex::VertexRecord;

/// Entry point of the remap kernel.
pub const KERNEL_ENTRY_POINT: &str = "CSMain";

/// Threads per work-group, must match `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: u32 = 256;

const VERTEX_BUFFER: &str = "Marker Vertex Buffer";
const STAGING_BUFFER: &str = "Marker Staging Buffer";

/// Errors raised while setting up or running the accelerator.
#[derive(Debug, Error)]
pub enum AcceleratorError {
    #[error("failed to read shader at {path}: {source}")]
    ShaderNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no suitable adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("{count} vertices need {groups} work-groups, the device allows {limit}")]
    TooManyVertices { count: usize, groups: u32, limit: u32 },

    #[error("{size} byte vertex buffer exceeds the storage binding limit of {limit} bytes")]
    BufferTooLarge { size: u64, limit: u64 },

    #[error("buffer '{0}' was never created")]
    MissingBuffer(&'static str),

    #[error("write to '{buffer_name}' ends at byte {end}, buffer holds {size}")]
    BufferOverrun {
        buffer_name: &'static str,
        end: u64,
        size: u64,
    },

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("failed to map staging buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("staging buffer mapping was dropped before completing")]
    MapCallbackDropped,
}

/// Number of work-groups needed to cover `vertex_count` vertices.
pub fn workgroup_count(vertex_count: usize) -> u32 {
    vertex_count.div_ceil(WORKGROUP_SIZE as usize) as u32
}

/// Remaps packed records from source space into target space.
///
/// Implementations must produce exactly what `VertexRecord::remap` produces,
/// so the two execution strategies stay interchangeable.
pub trait Accelerator {
    fn remap(&mut self, records: &mut [VertexRecord]) -> Result<(), AcceleratorError>;
}

/// `Accelerator` backed by a `wgpu` compute pipeline.
pub struct WgpuAccelerator {
    device: Device,
    queue: Queue,
    pipeline: ComputePipeline,
    buffer_state: BufferState,
}

impl WgpuAccelerator {
    /// Loads the WGSL kernel at `shader_path` and creates a compute device.
    ///
    /// Blocks until the adapter and device are available.
    pub fn new(shader_path: &Path) -> Result<Self, AcceleratorError> {
        let shader_source = std::fs::read_to_string(shader_path).map_err(|source| {
            AcceleratorError::ShaderNotFound {
                path: shader_path.to_path_buf(),
                source,
            }
        })?;

        pollster::block_on(Self::from_source(shader_source))
    }

    /// Creates the device and pipeline for an already loaded kernel.
    pub async fn from_source(shader_source: String) -> Result<Self, AcceleratorError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        info!("Accelerator adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Marker Accelerator"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Marker Transform Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Marker Transform Pipeline"),
            layout: None,
            module: &shader,
            entry_point: Some(KERNEL_ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(WgpuAccelerator {
            device,
            queue,
            pipeline,
            buffer_state: BufferState::new(),
        })
    }

    /// Checks the dispatch against the device limits.
    fn check_limits(&self, records: &[VertexRecord]) -> Result<(u32, u64), AcceleratorError> {
        let limits = self.device.limits();

        let groups = workgroup_count(records.len());
        if groups > limits.max_compute_workgroups_per_dimension {
            return Err(AcceleratorError::TooManyVertices {
                count: records.len(),
                groups,
                limit: limits.max_compute_workgroups_per_dimension,
            });
        }

        let size = std::mem::size_of_val(records) as u64;
        let limit = u64::from(limits.max_storage_buffer_binding_size);
        if size > limit {
            return Err(AcceleratorError::BufferTooLarge { size, limit });
        }

        Ok((groups, size))
    }
}

impl Accelerator for WgpuAccelerator {
    fn remap(&mut self, records: &mut [VertexRecord]) -> Result<(), AcceleratorError> {
        let Some(binding_size) = NonZeroU64::new(std::mem::size_of_val(records) as u64) else {
            return Ok(());
        };
        let (groups, size) = self.check_limits(records)?;

        self.buffer_state.ensure_capacity(
            &self.device,
            VERTEX_BUFFER,
            size,
            BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        );
        self.buffer_state.ensure_capacity(
            &self.device,
            STAGING_BUFFER,
            size,
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        );
        self.buffer_state
            .write_buffer(&self.queue, VERTEX_BUFFER, 0, bytemuck::cast_slice(records))?;

        let vertex_buffer = self.buffer_state.get_buffer(VERTEX_BUFFER)?;
        let staging_buffer = self.buffer_state.get_buffer(STAGING_BUFFER)?;

        // Bind only the live prefix so arrayLength() in the kernel sees n records.
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Marker Transform Bind Group"),
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: vertex_buffer,
                    offset: 0,
                    size: Some(binding_size),
                }),
            }],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Marker Transform Encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Marker Transform Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, Some(&bind_group), &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }

        encoder.copy_buffer_to_buffer(vertex_buffer, 0, staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let staging_slice = staging_buffer.slice(..size);
        let (sender, receiver) = mpsc::channel();
        staging_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::PollType::Wait)?;
        receiver
            .recv()
            .map_err(|_| AcceleratorError::MapCallbackDropped)??;

        {
            let mapped = staging_slice.get_mapped_range();
            records.copy_from_slice(bytemuck::cast_slice(&mapped));
        }
        staging_buffer.unmap();

        let usage = self.buffer_state.usage();
        debug!(
            "Remapped {} vertices in {} work-groups ({} of {} bytes used on device, {} writes, {} reallocations)",
            records.len(),
            groups,
            usage.used_memory,
            usage.allocated_memory,
            usage.times_written,
            usage.times_grown
        );

        Ok(())
    }
}
