use crate::bindings::SparseHandle;
use crate::error::CgCoreError;
use crate::ops::Launcher;
use bytemuck::{Pod, Zeroable};
use cfg_if::cfg_if;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, OnceLock,
};
use wgpu::{util::DeviceExt, PollType};

/// Options used when requesting the adapter and device.
#[derive(Debug, Clone)]
pub struct GpuContextOptions {
    pub power_preference: wgpu::PowerPreference,
    pub backends: wgpu::Backends,
    pub force_fallback_adapter: bool,
    /// Enable `SHADER_F64` when the adapter offers it.
    pub request_f64: bool,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let backends = wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL;
            } else {
                let backends = wgpu::Backends::PRIMARY;
            }
        }
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends,
            force_fallback_adapter: false,
            request_f64: true,
        }
    }
}

/// Lifecycle of the sparse library handle owned by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No sparse handle has been acquired yet.
    Uninitialized,
    /// The sparse handle exists and library calls can be issued.
    Ready,
}

/// First device fault reported through the uncaptured error callback.
///
/// The slot is shared by the context, its launchers and its sparse handle; the
/// call that observes a fault takes it and returns it as `WgpuError`.
#[derive(Debug, Clone, Default)]
pub(crate) struct FaultSlot(Arc<Mutex<Option<String>>>);

impl FaultSlot {
    pub(crate) fn install(&self, device: &wgpu::Device) {
        let slot = self.clone();
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            log::error!("Device fault: {}", error);
            slot.record(error.to_string());
        }));
    }

    fn record(&self, message: String) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(message);
            }
        }
    }

    /// Returns the pending fault, if any, and clears the slot.
    pub(crate) fn check(&self) -> Result<(), CgCoreError> {
        let pending = self
            .0
            .lock()
            .map_err(|_| CgCoreError::Internal("Fault slot lock poisoned".to_string()))?
            .take();
        match pending {
            Some(message) => Err(CgCoreError::WgpuError(message)),
            None => Ok(()),
        }
    }
}

/// Wrapper for the WGPU device and queue, including transfer counters,
/// the fault slot, the kernel launcher and the sparse library handle.
#[derive(Debug)]
pub struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    pub(crate) adapter_info: wgpu::AdapterInfo,
    /// Tracks bytes transferred from CPU to GPU via instrumented methods.
    bytes_to_gpu: AtomicU64,
    /// Tracks bytes transferred from GPU to CPU via instrumented methods.
    bytes_from_gpu: AtomicU64,
    pub(crate) faults: FaultSlot,
    pub(crate) launcher: Launcher,
    sparse_handle: OnceLock<SparseHandle>,
}

impl GpuContext {
    /// Requests an adapter and device according to `options`.
    pub(crate) async fn new(options: &GpuContextOptions) -> Result<Self, CgCoreError> {
        log::info!("Initializing WGPU context ({:?})", options.backends);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        log::debug!("Requesting adapter");
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None, // No surface needed for compute
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .map_err(|e| CgCoreError::WgpuInitError(format!("No suitable adapter found: {}", e)))?;

        let adapter_info = adapter.get_info();
        log::info!("Selected Adapter: {:?}", adapter_info);
        log::debug!("Adapter Features: {:?}", adapter.features());

        cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let base_limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let base_limits = wgpu::Limits::default();
            }
        }
        let adapter_limits = adapter.limits();
        let mut limits = base_limits.using_resolution(adapter_limits.clone());
        // SpMV binds seven storage buffers.
        limits.max_storage_buffers_per_shader_stage = limits
            .max_storage_buffers_per_shader_stage
            .max(8)
            .min(adapter_limits.max_storage_buffers_per_shader_stage);
        log::debug!("Adjusted limits: {:?}", limits);

        let mut required_features = wgpu::Features::empty();
        if options.request_f64 {
            if adapter.features().contains(wgpu::Features::SHADER_F64) {
                required_features |= wgpu::Features::SHADER_F64;
            } else {
                log::warn!("Adapter does not offer SHADER_F64; double precision kernels are unavailable");
            }
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("cg_core device"),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                required_features,
                required_limits: limits,
            })
            .await
            .map_err(|e| CgCoreError::WgpuInitError(format!("Failed to request device: {}", e)))?;

        log::info!("Device and queue obtained successfully");
        log::debug!("Device Features: {:?}", device.features());

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let faults = FaultSlot::default();
        faults.install(&device);
        let launcher = Launcher::new(Arc::clone(&device), Arc::clone(&queue), faults.clone());

        Ok(Self {
            device,
            queue,
            adapter_info,
            bytes_to_gpu: AtomicU64::new(0),
            bytes_from_gpu: AtomicU64::new(0),
            faults,
            launcher,
            sparse_handle: OnceLock::new(),
        })
    }

    pub fn supports_f64(&self) -> bool {
        self.device.features().contains(wgpu::Features::SHADER_F64)
    }

    pub fn state(&self) -> ContextState {
        if self.sparse_handle.get().is_some() {
            ContextState::Ready
        } else {
            ContextState::Uninitialized
        }
    }

    /// Returns the context's sparse library handle, creating it on first use.
    pub(crate) fn sparse_handle(&self) -> &SparseHandle {
        self.sparse_handle.get_or_init(|| {
            log::info!("Creating sparse library handle");
            SparseHandle::new(
                Arc::clone(&self.device),
                Arc::clone(&self.queue),
                self.faults.clone(),
            )
        })
    }

    /// Waits for all submitted work and surfaces any pending device fault.
    pub(crate) fn synchronize(&self) -> Result<(), CgCoreError> {
        cfg_if! {
            if #[cfg(not(target_arch = "wasm32"))] {
                self.device
                    .poll(PollType::Wait)
                    .map_err(|e| CgCoreError::WgpuError(format!("Device poll failed: {:?}", e)))?;
            }
        }
        self.faults.check()
    }

    /// Helper to create a GPU buffer with initial data and track the transfer size.
    pub(crate) fn create_gpu_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {}, now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
        buffer
    }

    /// Writes `data` to the start of an existing buffer and tracks the transfer size.
    pub(crate) fn write_buffer<T: Pod>(
        &self,
        buffer: &wgpu::Buffer,
        data: &[T],
    ) -> Result<(), CgCoreError> {
        let byte_len = std::mem::size_of_val(data) as u64;
        if byte_len == 0 {
            log::debug!("Skipping write for 0 bytes");
            return Ok(());
        }
        if buffer.size() < byte_len {
            return Err(CgCoreError::Internal(format!(
                "Target buffer size ({}) is smaller than data size ({})",
                buffer.size(),
                byte_len
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(CgCoreError::Internal(
                "Target buffer must have COPY_DST usage".to_string(),
            ));
        }

        log::debug!("Writing {} bytes to buffer", byte_len);
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(data));

        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {} (write_buffer), now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Helper to create an empty GPU buffer (useful for shader outputs).
    /// Does not count towards `bytes_to_gpu` as no data is initially transferred.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Copies `size` bytes between two buffers of this context.
    pub(crate) fn copy_buffer(
        &self,
        source: &wgpu::Buffer,
        destination: &wgpu::Buffer,
        size: u64,
    ) -> Result<(), CgCoreError> {
        if size == 0 {
            return Ok(());
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_buffer_encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, destination, 0, size);
        self.queue.submit(Some(encoder.finish()));
        self.faults.check()
    }

    /// Reads `element_count` elements of a GPU buffer back to the CPU.
    ///
    /// Waits for all previously submitted work, so the returned values are final.
    /// The buffer must have `COPY_SRC` usage.
    pub(crate) async fn read_buffer_to_cpu<T: Pod + Zeroable>(
        &self,
        buffer: &wgpu::Buffer,
        element_count: usize,
    ) -> Result<Vec<T>, CgCoreError> {
        let element_size = std::mem::size_of::<T>();
        let size_bytes = (element_count * element_size) as u64;

        if size_bytes == 0 {
            log::debug!("Skipping readback for 0 bytes");
            return Ok(Vec::new());
        }
        if buffer.size() < size_bytes {
            return Err(CgCoreError::Internal(format!(
                "GPU buffer size ({}) is smaller than expected size based on element count ({})",
                buffer.size(),
                size_bytes
            )));
        }

        log::debug!(
            "Creating staging buffer for readback ({} bytes)",
            size_bytes
        );
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer_for_readback"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_buffer_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if let Err(e) = sender.send(result) {
                log::error!("Failed to send map result back: {:?}", e);
            }
        });

        self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);
        log::trace!(
            "bytes_from_gpu incremented by {}, now: {}",
            size_bytes,
            self.bytes_from_gpu.load(Ordering::Relaxed)
        );

        cfg_if! {
            if #[cfg(not(target_arch = "wasm32"))] {
                log::debug!("Polling device to wait for buffer mapping");
                self.device
                    .poll(PollType::Wait)
                    .map_err(|e| CgCoreError::WgpuError(format!("Device poll failed: {:?}", e)))?;
            }
        }

        match receiver.await {
            Ok(Ok(())) => {
                let result = {
                    let data = buffer_slice.get_mapped_range();
                    let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
                    values
                };
                staging_buffer.unmap();
                log::debug!(
                    "Buffer readback complete and unmapped ({} bytes)",
                    size_bytes
                );
                self.faults.check()?;
                Ok(result)
            }
            Ok(Err(e)) => {
                log::error!("Failed to map buffer: {:?}", e);
                Err(CgCoreError::WgpuError(format!(
                    "Buffer mapping failed: {}",
                    e
                )))
            }
            Err(_) => Err(CgCoreError::Internal(
                "Channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    /// Returns the current transfer statistics.
    pub(crate) fn get_transfer_stats(&self) -> (u64, u64) {
        (
            self.bytes_to_gpu.load(Ordering::Relaxed),
            self.bytes_from_gpu.load(Ordering::Relaxed),
        )
    }

    /// Resets the transfer statistics counters to zero.
    pub(crate) fn reset_transfer_stats(&self) {
        self.bytes_to_gpu.store(0, Ordering::Relaxed);
        self.bytes_from_gpu.store(0, Ordering::Relaxed);
        log::info!("GPU transfer counters reset.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_slot_keeps_first_fault_and_clears_on_check() {
        let slot = FaultSlot::default();
        assert!(slot.check().is_ok());

        slot.record("first".to_string());
        slot.record("second".to_string());
        match slot.check() {
            Err(CgCoreError::WgpuError(msg)) => assert_eq!(msg, "first"),
            other => panic!("Expected WgpuError, got {:?}", other),
        }
        assert!(slot.check().is_ok());
    }

    #[test]
    fn default_options_request_f64() {
        let options = GpuContextOptions::default();
        assert!(options.request_f64);
        assert!(!options.force_fallback_adapter);
    }
}
