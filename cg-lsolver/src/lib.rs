//! `cg-lsolver`: block Conjugate Gradient on the reference and wgpu backends.
//!
//! The solver is written once against the [`algorithms::cg::CgKernels`] stage
//! interface; the backend is a generic parameter fixed when the solve is
//! configured. Every column of the right-hand side block is an independent
//! system.

// Core modules
pub mod algorithms;

// Re-export from cg_core
pub use cg_core::{
    CgCoreError, Complex32, Complex64, Csr, CsrGpu, Dense, DenseGpu, Device, GpuDevice, Matrix,
    ReferenceDevice, ValueType,
};
