use crate::bindings::SparseHandle;
use crate::context::{ContextState, GpuContext, GpuContextOptions};
use crate::dense::Dense;
use crate::dense_gpu::DenseGpu;
use crate::error::CgCoreError;
use crate::ops::{Binding, Kernel};
use crate::shaders;
use crate::sparse_matrix::{Csr, CsrGpu};
use crate::value::{IndexType, ValueType};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

/// An execution backend.
pub trait Device: std::fmt::Debug {
    /// Short name used in logs and error messages.
    fn backend_name(&self) -> &'static str;

    /// Number of devices of this kind visible to the process.
    fn get_num_devices() -> usize
    where
        Self: Sized;

    /// Blocks until all submitted work has completed and reports pending faults.
    fn synchronize(&self) -> Result<(), CgCoreError>;
}

/// Sequential host backend; owns no resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceDevice;

impl Device for ReferenceDevice {
    fn backend_name(&self) -> &'static str {
        "reference"
    }

    fn get_num_devices() -> usize {
        1
    }

    fn synchronize(&self) -> Result<(), CgCoreError> {
        Ok(())
    }
}

/// Represents a GPU execution device, holding the WGPU context.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub struct GpuDevice {
    context: Arc<GpuContext>,
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
impl GpuDevice {
    /// Creates a new GpuDevice with default options.
    pub async fn new() -> Result<GpuDevice, CgCoreError> {
        Self::with_options(GpuContextOptions::default()).await
    }

    /// Returns the current GPU transfer statistics (bytes_to_gpu, bytes_from_gpu).
    pub fn get_transfer_stats(&self) -> TransferStats {
        let (bytes_to_gpu, bytes_from_gpu) = self.context.get_transfer_stats();
        TransferStats {
            bytes_to_gpu,
            bytes_from_gpu,
        }
    }

    /// Resets the GPU transfer statistics counters to zero.
    pub fn reset_transfer_stats(&self) {
        self.context.reset_transfer_stats();
    }

    pub fn supports_f64(&self) -> bool {
        self.context.supports_f64()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DotParams {
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}

impl GpuDevice {
    pub async fn with_options(options: GpuContextOptions) -> Result<GpuDevice, CgCoreError> {
        let context = GpuContext::new(&options).await?;
        log::info!("GpuDevice created successfully");
        Ok(Self {
            context: Arc::new(context),
        })
    }

    /// Blocking variant of [`GpuDevice::new`].
    #[cfg(feature = "native")]
    pub fn new_blocking() -> Result<GpuDevice, CgCoreError> {
        pollster::block_on(Self::new())
    }

    pub(crate) fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.context.adapter_info
    }

    pub fn state(&self) -> ContextState {
        self.context.state()
    }

    /// The context's sparse library handle, created on first use.
    pub fn sparse_handle(&self) -> &SparseHandle {
        self.context.sparse_handle()
    }

    // --- Resource Creation ---

    pub fn create_dense<V: ValueType>(&self, rows: usize, cols: usize) -> DenseGpu<V> {
        DenseGpu::create(self, rows, cols)
    }

    pub fn upload_dense<V: ValueType>(&self, source: &Dense<V>) -> DenseGpu<V> {
        DenseGpu::from_dense(self, source)
    }

    pub fn create_csr<V: ValueType, I: IndexType>(&self, source: &Csr<V, I>) -> CsrGpu<V, I> {
        CsrGpu::from_csr(self, source)
    }

    /// Fails with `InvalidArgument` unless `block` was created on this device.
    pub fn check_owned<V: ValueType>(&self, block: &DenseGpu<V>, name: &str) -> Result<(), CgCoreError> {
        if Arc::ptr_eq(&self.context.device, &block.context.device) {
            Ok(())
        } else {
            Err(CgCoreError::InvalidArgument(format!(
                "{} ('{}') was created on a different device",
                name,
                block.label()
            )))
        }
    }

    // --- Operations ---

    /// Runs a generated compute kernel on this device, one thread per work item.
    ///
    /// Storage `bindings` take slots `0..len` and `params` is bound as a uniform
    /// right after them. Kernels are cached by `kernel.name`.
    pub fn launch(
        &self,
        kernel: &Kernel<'_>,
        source: impl FnOnce() -> String,
        bindings: &[Binding<'_>],
        params: &[u8],
        work_items: usize,
    ) -> Result<(), CgCoreError> {
        self.context
            .launcher
            .launch(kernel, source, bindings, params, work_items)
    }

    /// Per-column `conj(x[:, j]) . y[:, j]` into the `cols x 1` block `result`.
    pub fn compute_dot<V: ValueType>(
        &self,
        x: &DenseGpu<V>,
        y: &DenseGpu<V>,
        result: &mut DenseGpu<V>,
    ) -> Result<(), CgCoreError> {
        self.check_owned(x, "x")?;
        self.check_owned(y, "y")?;
        self.check_owned(result, "result")?;
        if x.rows() != y.rows() || x.cols() != y.cols() {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Block shapes for dot product mismatch: {}x{} != {}x{}",
                x.rows(),
                x.cols(),
                y.rows(),
                y.cols()
            )));
        }
        if result.rows() != x.cols() || result.cols() != 1 {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Dot product result must be {}x1, got {}x{}",
                x.cols(),
                result.rows(),
                result.cols()
            )));
        }

        let params = DotParams {
            rows: crate::bindings::to_u32(x.rows(), "rows")?,
            cols: crate::bindings::to_u32(x.cols(), "columns")?,
            _pad0: 0,
            _pad1: 0,
        };
        let name = format!("column_dot_{}", V::KIND.suffix());
        self.launch(
            &Kernel {
                name: &name,
                entry_point: "main",
                kind: V::KIND,
            },
            || shaders::column_dot(V::KIND),
            &[
                Binding::read(x.buffer()),
                Binding::read(y.buffer()),
                Binding::write(result.buffer()),
            ],
            bytemuck::bytes_of(&params),
            x.cols(),
        )
    }

    /// Copies `source` into `destination`, reallocating it if the shapes differ.
    pub fn copy<V: ValueType>(&self, source: &DenseGpu<V>, destination: &mut DenseGpu<V>) -> Result<(), CgCoreError> {
        self.check_owned(source, "source")?;
        self.check_owned(destination, "destination")?;
        destination.copy_from_gpu(source)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn count_adapters() -> usize {
    let backends = GpuContextOptions::default().backends;
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });
    let count = instance.enumerate_adapters(backends).len();
    log::debug!("Found {} wgpu adapter(s)", count);
    count
}

// Adapters can only be requested asynchronously in the browser.
#[cfg(target_arch = "wasm32")]
fn count_adapters() -> usize {
    1
}

impl Device for GpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn get_num_devices() -> usize {
        count_adapters()
    }

    fn synchronize(&self) -> Result<(), CgCoreError> {
        self.context.synchronize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_device_is_always_available() {
        assert_eq!(ReferenceDevice::get_num_devices(), 1);
        assert_eq!(ReferenceDevice.backend_name(), "reference");
        assert!(ReferenceDevice.synchronize().is_ok());
    }

    #[test]
    fn dot_params_fill_one_uniform_slot() {
        assert_eq!(std::mem::size_of::<DotParams>(), 16);
    }
}
