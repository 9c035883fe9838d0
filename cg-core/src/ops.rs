// Kernel launcher shared by the context, the sparse library handle and the
// solver stages. Shader modules and pipelines are cached by kernel name.

use crate::context::FaultSlot;
use crate::error::CgCoreError;
use crate::value::ValueKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;

/// Threads per workgroup; must match `@workgroup_size` in generated shaders.
pub const WORKGROUP_SIZE: u32 = 256;

/// How a kernel accesses a storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A storage buffer bound to a kernel, in binding order.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    buffer: &'a wgpu::Buffer,
    access: Access,
}

impl<'a> Binding<'a> {
    pub fn read(buffer: &'a wgpu::Buffer) -> Self {
        Self {
            buffer,
            access: Access::ReadOnly,
        }
    }

    pub fn write(buffer: &'a wgpu::Buffer) -> Self {
        Self {
            buffer,
            access: Access::ReadWrite,
        }
    }
}

/// Identifies a compute entry point.
///
/// `name` is the cache key of the shader module and must be unique per
/// generated source (include the value kind in it).
#[derive(Debug, Clone, Copy)]
pub struct Kernel<'a> {
    pub name: &'a str,
    pub entry_point: &'a str,
    pub kind: ValueKind,
}

struct CachedKernel {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

#[derive(Default)]
struct PipelineCache {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
    kernels: HashMap<String, Arc<CachedKernel>>,
}

pub(crate) struct Launcher {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    faults: FaultSlot,
    cache: Mutex<PipelineCache>,
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .cache
            .lock()
            .map(|cache| cache.kernels.len())
            .unwrap_or_default();
        f.debug_struct("Launcher")
            .field("cached_kernels", &cached)
            .finish()
    }
}

/// Splits `work_items` into a workgroup grid; shaders recover the flat index
/// with `flat_index` from the shader prelude.
pub(crate) fn dispatch_grid(work_items: usize, max_per_dimension: u32) -> Result<(u32, u32), CgCoreError> {
    let groups = work_items.div_ceil(WORKGROUP_SIZE as usize);
    let max = max_per_dimension as usize;
    if groups <= max {
        return Ok((groups as u32, 1));
    }
    let rows = groups.div_ceil(max);
    if rows > max {
        return Err(CgCoreError::InvalidDimensions(format!(
            "{} work items exceed the dispatch limit",
            work_items
        )));
    }
    Ok((max as u32, rows as u32))
}

impl Launcher {
    pub(crate) fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, faults: FaultSlot) -> Self {
        Self {
            device,
            queue,
            faults,
            cache: Mutex::new(PipelineCache::default()),
        }
    }

    pub(crate) fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Fails with `MissingDeviceFeature` for double precision kinds on devices without `SHADER_F64`.
    pub(crate) fn require_kind(&self, kind: ValueKind) -> Result<(), CgCoreError> {
        if kind.is_double() && !self.device.features().contains(wgpu::Features::SHADER_F64) {
            return Err(CgCoreError::MissingDeviceFeature(format!(
                "SHADER_F64 is required for {:?} kernels",
                kind
            )));
        }
        Ok(())
    }

    fn kernel(
        &self,
        kernel: &Kernel<'_>,
        source: impl FnOnce() -> String,
        bindings: &[Binding<'_>],
    ) -> Result<Arc<CachedKernel>, CgCoreError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| CgCoreError::Internal("Pipeline cache lock poisoned".to_string()))?;
        let key = format!("{}::{}", kernel.name, kernel.entry_point);
        if let Some(cached) = cache.kernels.get(&key) {
            return Ok(Arc::clone(cached));
        }

        log::debug!("Pipeline cache miss for '{}'", key);
        let module = match cache.modules.get(kernel.name) {
            Some(module) => Arc::clone(module),
            None => {
                let module = Arc::new(self.device.create_shader_module(
                    wgpu::ShaderModuleDescriptor {
                        label: Some(kernel.name),
                        source: wgpu::ShaderSource::Wgsl(source().into()),
                    },
                ));
                cache
                    .modules
                    .insert(kernel.name.to_string(), Arc::clone(&module));
                module
            }
        };

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .enumerate()
            .map(|(slot, binding)| wgpu::BindGroupLayoutEntry {
                binding: slot as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding.access == Access::ReadOnly,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: bindings.len() as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&key),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&key),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&key),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(kernel.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        let cached = Arc::new(CachedKernel { layout, pipeline });
        cache.kernels.insert(key, Arc::clone(&cached));
        Ok(cached)
    }

    /// Dispatches one thread per work item.
    ///
    /// `bindings` occupy slots `0..len`; `params` is bound as a uniform in the
    /// slot after them. Returns the first device fault raised while encoding
    /// or submitting.
    pub(crate) fn launch(
        &self,
        kernel: &Kernel<'_>,
        source: impl FnOnce() -> String,
        bindings: &[Binding<'_>],
        params: &[u8],
        work_items: usize,
    ) -> Result<(), CgCoreError> {
        self.require_kind(kernel.kind)?;
        if work_items == 0 {
            return Ok(());
        }
        let (groups_x, groups_y) = dispatch_grid(
            work_items,
            self.device.limits().max_compute_workgroups_per_dimension,
        )?;
        let cached = self.kernel(kernel, source, bindings)?;

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kernel params"),
                contents: params,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .enumerate()
            .map(|(slot, binding)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: binding.buffer.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: bindings.len() as u32,
            resource: params_buffer.as_entire_binding(),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name),
            layout: &cached.layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.name),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&cached.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        log::debug!(
            "Dispatching {}::{} over {} work items ({}x{} workgroups)",
            kernel.name,
            kernel.entry_point,
            work_items,
            groups_x,
            groups_y
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        self.faults.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_dispatch_is_one_dimensional() {
        assert_eq!(dispatch_grid(1, 65535).unwrap(), (1, 1));
        assert_eq!(dispatch_grid(256, 65535).unwrap(), (1, 1));
        assert_eq!(dispatch_grid(257, 65535).unwrap(), (2, 1));
    }

    #[test]
    fn large_dispatch_wraps_into_second_dimension() {
        let items = 65535 * 256 + 1;
        assert_eq!(dispatch_grid(items, 65535).unwrap(), (65535, 2));
        assert_eq!(dispatch_grid(10 * 256, 4).unwrap(), (4, 3));
    }

    #[test]
    fn oversized_dispatch_is_rejected() {
        let err = dispatch_grid(4 * 4 * 256 + 1, 4).unwrap_err();
        assert!(matches!(err, CgCoreError::InvalidDimensions(_)));
    }
}
