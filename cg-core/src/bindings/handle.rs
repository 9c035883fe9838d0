use super::PointerMode;
use crate::context::{FaultSlot, GpuContext};
use crate::error::CgCoreError;
use crate::ops::Launcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle of the sparse library, bound to one wgpu device.
///
/// Owns its own pipeline cache. Every call checks that the containers it is
/// given were created on the handle's device.
#[derive(Debug)]
pub struct SparseHandle {
    launcher: Launcher,
    device_pointers: AtomicBool,
}

impl SparseHandle {
    pub(crate) fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, faults: FaultSlot) -> Self {
        log::debug!("Sparse handle initialized in device pointer mode");
        Self {
            launcher: Launcher::new(device, queue, faults),
            device_pointers: AtomicBool::new(true),
        }
    }

    pub fn pointer_mode(&self) -> PointerMode {
        if self.device_pointers.load(Ordering::Relaxed) {
            PointerMode::Device
        } else {
            PointerMode::Host
        }
    }

    pub fn set_pointer_mode(&self, mode: PointerMode) {
        self.device_pointers
            .store(mode == PointerMode::Device, Ordering::Relaxed);
    }

    pub(crate) fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Fails with `InvalidArgument` unless `context` runs on this handle's device.
    pub(crate) fn check_owner(&self, context: &GpuContext, what: &str) -> Result<(), CgCoreError> {
        if Arc::ptr_eq(self.launcher.device(), &context.device) {
            Ok(())
        } else {
            Err(CgCoreError::InvalidArgument(format!(
                "{} belongs to a different device than the sparse handle",
                what
            )))
        }
    }
}

impl Drop for SparseHandle {
    fn drop(&mut self) {
        log::debug!("Sparse handle released");
    }
}
