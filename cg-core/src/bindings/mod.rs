//! Sparse library bindings.
//!
//! Routines are resolved per (value type, index width) through
//! [`is_supported`], a `const fn` over the associated constants of
//! [`ValueType`] and [`IndexType`]. Combinations the library has no routine
//! for return [`CgCoreError::NotSupported`] before any device work is issued.

mod handle;
mod spmv;
mod transpose;

pub use handle::SparseHandle;
pub use spmv::spmv;
pub use transpose::{conj_transpose, transpose};

use crate::device::GpuDevice;
use crate::error::CgCoreError;
use crate::value::{IndexType, IndexWidth, ValueKind, ValueType};
use std::fmt;

/// Library routines that go through the support table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SparseOp {
    Spmv,
    Transpose,
    ConjTranspose,
}

impl fmt::Display for SparseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SparseOp::Spmv => "spmv",
            SparseOp::Transpose => "transpose",
            SparseOp::ConjTranspose => "conj_transpose",
        };
        f.write_str(name)
    }
}

/// Operation applied to the matrix operand of [`spmv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    NonTranspose,
    Transpose,
}

/// Whether a conversion fills values or only the sparsity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Symbolic,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexBase {
    #[default]
    Zero,
    One,
}

impl IndexBase {
    pub const fn offset(self) -> u32 {
        match self {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        }
    }
}

/// Where the handle expects `alpha` and `beta` to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerMode {
    Host,
    Device,
}

/// A scalar argument: a host value, or a 1x1 block in device memory.
#[derive(Debug)]
pub enum Scalar<'a, V: ValueType> {
    Host(V),
    Device(&'a crate::dense_gpu::DenseGpu<V>),
}

/// Descriptor of a general matrix.
#[derive(Debug, PartialEq, Eq)]
pub struct MatDescr {
    index_base: IndexBase,
}

impl MatDescr {
    pub fn index_base(&self) -> IndexBase {
        self.index_base
    }

    pub fn set_index_base(&mut self, index_base: IndexBase) {
        self.index_base = index_base;
    }
}

impl Drop for MatDescr {
    fn drop(&mut self) {
        log::trace!("Matrix descriptor released");
    }
}

/// Support table of the sparse library.
pub const fn is_supported(op: SparseOp, kind: ValueKind, width: IndexWidth) -> bool {
    match (op, width) {
        (_, IndexWidth::I64) => false,
        (SparseOp::Spmv, IndexWidth::I32) => true,
        (SparseOp::Transpose, IndexWidth::I32) => !kind.is_complex(),
        (SparseOp::ConjTranspose, IndexWidth::I32) => false,
    }
}

/// Shared fallback for every unsupported instantiation.
pub(crate) fn not_supported<V: ValueType, I: IndexType>(op: SparseOp) -> CgCoreError {
    CgCoreError::NotSupported {
        op,
        value_type: V::NAME,
        index_width: I::WIDTH,
    }
}

pub(crate) fn check_supported<V: ValueType, I: IndexType>(op: SparseOp) -> Result<(), CgCoreError> {
    if is_supported(op, V::KIND, I::WIDTH) {
        Ok(())
    } else {
        log::debug!("{} has no routine for {} / {}", op, V::NAME, I::WIDTH);
        Err(not_supported::<V, I>(op))
    }
}

pub(crate) fn to_u32(value: usize, what: &str) -> Result<u32, CgCoreError> {
    u32::try_from(value).map_err(|_| {
        CgCoreError::InvalidDimensions(format!("{} ({}) exceeds the 32-bit range", what, value))
    })
}

/// Device buffer holding a scalar argument.
pub(crate) enum ScalarBuffer<'a> {
    Borrowed(&'a wgpu::Buffer),
    Owned(wgpu::Buffer),
}

impl ScalarBuffer<'_> {
    pub(crate) fn buffer(&self) -> &wgpu::Buffer {
        match self {
            ScalarBuffer::Borrowed(buffer) => buffer,
            ScalarBuffer::Owned(buffer) => buffer,
        }
    }
}

impl<'a, V: ValueType> Scalar<'a, V> {
    /// Resolves the scalar against the handle's pointer mode.
    pub(crate) fn resolve(
        self,
        handle: &SparseHandle,
        context: &crate::context::GpuContext,
        name: &str,
    ) -> Result<ScalarBuffer<'a>, CgCoreError> {
        match (handle.pointer_mode(), self) {
            (PointerMode::Device, Scalar::Device(block)) => {
                handle.check_owner(&block.context, name)?;
                if block.rows() != 1 || block.cols() != 1 {
                    return Err(CgCoreError::InvalidArgument(format!(
                        "{} must be a 1x1 block, got {}x{}",
                        name,
                        block.rows(),
                        block.cols()
                    )));
                }
                Ok(ScalarBuffer::Borrowed(block.buffer()))
            }
            (PointerMode::Host, Scalar::Host(value)) => Ok(ScalarBuffer::Owned(
                context.create_gpu_buffer_with_data(
                    name,
                    bytemuck::bytes_of(&value),
                    wgpu::BufferUsages::STORAGE,
                ),
            )),
            (mode, _) => Err(CgCoreError::InvalidArgument(format!(
                "{} does not match the handle's {:?} pointer mode",
                name, mode
            ))),
        }
    }
}

/// Creates a standalone sparse library handle for `device`, in device pointer mode.
pub fn init(device: &GpuDevice) -> SparseHandle {
    let context = device.context();
    SparseHandle::new(
        std::sync::Arc::clone(&context.device),
        std::sync::Arc::clone(&context.queue),
        context.faults.clone(),
    )
}

/// Releases a handle created by [`init`].
pub fn destroy(handle: SparseHandle) {
    drop(handle);
}

/// Creates a general matrix descriptor with zero-based indices.
pub fn create_mat_descr() -> MatDescr {
    log::trace!("Matrix descriptor created");
    MatDescr {
        index_base: IndexBase::Zero,
    }
}

/// Releases a descriptor created by [`create_mat_descr`].
pub fn destroy_mat_descr(descr: MatDescr) {
    drop(descr);
}
