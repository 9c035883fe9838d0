//! # CG Core Library
//!
//! Execution contexts, dense and CSR containers and the sparse library
//! bindings shared by the block CG solver.
//!
//! Two backends are provided: [`ReferenceDevice`] runs sequential host loops
//! and [`GpuDevice`] runs generated WGSL kernels through wgpu. Both produce the
//! same per-element operation sequence, so results can be compared directly.

pub mod bindings;
pub mod context;
pub mod dense;
pub mod dense_gpu;
pub mod device;
pub mod error;
pub mod matrix_data;
pub mod mtx_io;
pub mod ops; // Kernel launch plumbing, used by solver stages through GpuDevice::launch
pub mod shaders;
pub mod sparse_matrix;
pub mod traits;
pub mod value;

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

/// Routes `log` output to the browser console and panics to `console.error`.
#[cfg(feature = "wasm")]
#[wasm_bindgen(start)]
pub fn wasm_init() {
    static START: std::sync::Once = std::sync::Once::new();
    START.call_once(|| {
        wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));
        log::info!("cg-core WASM module initialized.");
    });
}

// Re-export public types
pub use bindings::{Action, IndexBase, MatDescr, Operation, PointerMode, Scalar, SparseHandle, SparseOp};
pub use context::{ContextState, GpuContextOptions};
pub use dense::Dense;
pub use dense_gpu::DenseGpu;
pub use device::{Device, GpuDevice, ReferenceDevice, TransferStats};
pub use error::CgCoreError;
pub use matrix_data::{MatrixData, Triplet};
pub use mtx_io::{read_raw, write_raw, Layout};
pub use sparse_matrix::{Csr, CsrGpu};
pub use traits::Matrix;
pub use value::{IndexType, IndexWidth, ValueKind, ValueType};

pub use num_complex::{Complex32, Complex64};
