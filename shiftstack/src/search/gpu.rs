//! GPU trajectory evaluator on wgpu compute.
//!
//! Vendor-neutral: wgpu picks whichever backend the host offers (Vulkan,
//! Metal, DX12). The ψ/φ planes, time vector, and candidate grid are
//! uploaded as storage buffers, one thread per starting pixel runs the
//! shared inner loop from `search.wgsl`, and the W·H·K output slots are
//! read back and handed to the global ranking stage.
//!
//! Everything here is tied to a single `evaluate` call; wgpu resources
//! are dropped on every exit path, success or failure.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::SearchError;
use crate::psiphi::PsiPhi;
use crate::search::grid::SearchConfig;
use crate::trajectory::Trajectory;

/// Uniform block mirrored by `SearchParams` in search.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SearchParams {
    width: u32,
    height: u32,
    num_times: u32,
    num_candidates: u32,
    results_per_pixel: u32,
    min_observations: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Workgroup footprint baked into the shader's `@workgroup_size`.
const WORKGROUP_DIM: u32 = 8;

/// A wgpu device with the trajectory pipeline compiled.
pub(crate) struct GpuEvaluator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuEvaluator {
    /// Initialize an adapter, device, and the compute pipeline.
    ///
    /// Fails with [`SearchError::DeviceUnavailable`] when the host has no
    /// usable adapter (headless CI, machines without Vulkan/Metal).
    pub fn new() -> Result<Self, SearchError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| {
            SearchError::DeviceUnavailable("no compute adapter found".to_string())
        })?;

        let info = adapter.get_info();
        info!(
            "gpu evaluator on {} ({:?}, {:?})",
            info.name, info.backend, info.device_type
        );

        // Request the adapter's full limits: a 40-frame 2k x 2k stack
        // needs psi/phi bindings far beyond the 128 MiB default.
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("shiftstack"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| SearchError::DeviceUnavailable(format!("device request failed: {e}")))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("search.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("search.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trajectory search"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("trajectory search"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("evaluate_trajectories"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "evaluate_trajectories",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(GpuEvaluator {
            device,
            queue,
            pipeline,
            bind_group_layout,
        })
    }

    /// Run the exhaustive evaluation and read back the per-pixel slots.
    pub fn evaluate(
        &self,
        psi_phi: &PsiPhi,
        candidates: &[(f32, f32)],
        config: &SearchConfig,
    ) -> Result<Vec<Trajectory>, SearchError> {
        let width = psi_phi.width();
        let height = psi_phi.height();
        let num_slots = width * height * config.results_per_pixel;

        let plane_bytes = (psi_phi.num_frames() * width * height * 4) as u64;
        let result_bytes = (num_slots * std::mem::size_of::<Trajectory>()) as u64;
        let limits = self.device.limits();
        let largest = plane_bytes.max(result_bytes);
        if largest > limits.max_storage_buffer_binding_size as u64 {
            return Err(SearchError::AllocationFailure(format!(
                "buffer of {largest} bytes exceeds device binding limit {}",
                limits.max_storage_buffer_binding_size
            )));
        }

        debug!(
            "gpu evaluator: {width}x{height} pixels x {} candidates, {plane_bytes} plane bytes",
            candidates.len()
        );

        let params = SearchParams {
            width: width as u32,
            height: height as u32,
            num_times: psi_phi.num_frames() as u32,
            num_candidates: candidates.len() as u32,
            results_per_pixel: config.results_per_pixel as u32,
            min_observations: config.min_observations,
            _pad0: 0,
            _pad1: 0,
        };
        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("search params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let psi_buf = self.upload_planes("psi planes", &psi_phi.psi);
        let phi_buf = self.upload_planes("phi planes", &psi_phi.phi);

        let times_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("frame times"),
                contents: bytemuck::cast_slice(&psi_phi.times),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let mut velocity_data = Vec::with_capacity(candidates.len() * 2);
        for &(vx, vy) in candidates {
            velocity_data.push(vx);
            velocity_data.push(vy);
        }
        let candidates_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("candidate velocities"),
                contents: bytemuck::cast_slice(&velocity_data),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let results_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("result slots"),
            size: result_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trajectory search"),
            layout: &self.bind_group_layout,
            entries: &[
                bind(0, &params_buf),
                bind(1, &psi_buf),
                bind(2, &phi_buf),
                bind(3, &times_buf),
                bind(4, &candidates_buf),
                bind(5, &results_buf),
            ],
        });

        let readback_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("result readback"),
            size: result_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("trajectory search"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("evaluate_trajectories"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let dx = (width as u32).div_ceil(WORKGROUP_DIM);
            let dy = (height as u32).div_ceil(WORKGROUP_DIM);
            pass.dispatch_workgroups(dx, dy, 1);
        }
        encoder.copy_buffer_to_buffer(&results_buf, 0, &readback_buf, 0, result_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Block until the dispatch and copy complete, then map.
        let slice = readback_buf.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| {
                SearchError::AllocationFailure("result readback never completed".to_string())
            })?
            .map_err(|e| SearchError::AllocationFailure(format!("result map failed: {e}")))?;

        let trajectories = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, Trajectory>(&mapped).to_vec()
        };
        readback_buf.unmap();

        Ok(trajectories)
    }

    /// Concatenate per-frame planes into one storage buffer.
    fn upload_planes(&self, label: &str, planes: &[crate::image::raw::RawImage]) -> wgpu::Buffer {
        let mut data = Vec::with_capacity(planes.len() * planes[0].pixels().len());
        for plane in planes {
            data.extend(plane.pixels().iter().copied());
        }
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&data),
                usage: wgpu::BufferUsages::STORAGE,
            })
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
