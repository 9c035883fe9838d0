use crate::context::GpuContext;
use crate::dense::Dense;
use crate::device::GpuDevice;
use crate::error::CgCoreError;
use crate::traits::Matrix;
use crate::value::ValueType;
use std::marker::PhantomData;
use std::{mem, sync::Arc};

const DENSE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Dense block stored row-major in a `wgpu::Buffer`.
///
/// The buffer always holds at least one element, since empty storage
/// bindings are not allowed.
#[derive(Debug)]
pub struct DenseGpu<V: ValueType> {
    buffer: wgpu::Buffer,
    rows: usize,
    cols: usize,
    label: String,
    pub(crate) context: Arc<GpuContext>,
    _marker: PhantomData<V>,
}

fn byte_size<V>(len: usize) -> u64 {
    (len.max(1) * mem::size_of::<V>()) as u64
}

impl<V: ValueType> DenseGpu<V> {
    /// Creates a zero-filled block on `device`.
    pub fn create(device: &GpuDevice, rows: usize, cols: usize) -> Self {
        Self::empty_on(device.context(), "dense block", rows, cols)
    }

    pub(crate) fn empty_on(context: &Arc<GpuContext>, label: &str, rows: usize, cols: usize) -> Self {
        let buffer = context.create_empty_buffer(label, byte_size::<V>(rows * cols), DENSE_USAGE);
        Self {
            buffer,
            rows,
            cols,
            label: label.to_string(),
            context: Arc::clone(context),
            _marker: PhantomData,
        }
    }

    fn upload_on(context: &Arc<GpuContext>, label: &str, source: &Dense<V>) -> Self {
        let buffer = if source.is_empty() {
            context.create_empty_buffer(label, byte_size::<V>(0), DENSE_USAGE)
        } else {
            context.create_gpu_buffer_with_data(
                label,
                bytemuck::cast_slice(source.values()),
                DENSE_USAGE,
            )
        };
        Self {
            buffer,
            rows: source.rows(),
            cols: source.cols(),
            label: label.to_string(),
            context: Arc::clone(context),
            _marker: PhantomData,
        }
    }

    /// Uploads a host block to `device`.
    pub fn from_dense(device: &GpuDevice, source: &Dense<V>) -> Self {
        Self::upload_on(device.context(), "dense block", source)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Underlying buffer, for binding the block to a kernel.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// True when both blocks live on the same wgpu device.
    pub fn same_device(&self, other: &DenseGpu<V>) -> bool {
        Arc::ptr_eq(&self.context.device, &other.context.device)
    }

    /// Overwrites the block with a host block, reallocating if the dimensions differ.
    pub fn copy_from(&mut self, source: &Dense<V>) -> Result<(), CgCoreError> {
        if self.rows != source.rows() || self.cols != source.cols() {
            log::debug!(
                "Reallocating '{}' from {}x{} to {}x{}",
                self.label,
                self.rows,
                self.cols,
                source.rows(),
                source.cols()
            );
            *self = Self::upload_on(&self.context, &self.label, source);
            return Ok(());
        }
        self.context.write_buffer(&self.buffer, source.values())
    }

    /// Overwrites the block with another block of the same context.
    pub fn copy_from_gpu(&mut self, source: &DenseGpu<V>) -> Result<(), CgCoreError> {
        if !self.same_device(source) {
            return Err(CgCoreError::InvalidArgument(format!(
                "Cannot copy '{}' into '{}': blocks belong to different devices",
                source.label, self.label
            )));
        }
        if self.rows != source.rows || self.cols != source.cols {
            *self = Self::empty_on(&self.context, &self.label, source.rows, source.cols);
        }
        let size = (source.len() * mem::size_of::<V>()) as u64;
        self.context.copy_buffer(&source.buffer, &self.buffer, size)
    }

    /// Fills every element with `value`.
    pub fn fill(&self, value: V) -> Result<(), CgCoreError> {
        let values = vec![value; self.len()];
        self.context.write_buffer(&self.buffer, &values)
    }

    /// Reads the block's contents back to the CPU in row-major order.
    /// Waits for all work previously submitted on the context.
    pub async fn read_contents(&self) -> Result<Vec<V>, CgCoreError> {
        self.context
            .read_buffer_to_cpu(&self.buffer, self.len())
            .await
    }

    pub async fn to_dense(&self) -> Result<Dense<V>, CgCoreError> {
        let values = self.read_contents().await?;
        Dense::from_values(self.rows, self.cols, values)
    }
}

impl<V: ValueType> Matrix for DenseGpu<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_hold_at_least_one_element() {
        assert_eq!(byte_size::<f64>(0), 8);
        assert_eq!(byte_size::<f32>(6), 24);
        assert_eq!(byte_size::<num_complex::Complex64>(2), 32);
    }
}
