use thiserror::Error;

use crate::bindings::SparseOp;
use crate::value::IndexWidth;

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[derive(Error, Debug)]
pub enum CgCoreError {
    #[error("WGPU initialization failed: {0}")]
    WgpuInitError(String),

    /// A fault reported by the device (validation error, lost device, failed mapping).
    #[error("WGPU error: {0}")]
    WgpuError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The sparse library has no routine for this value type / index width.
    #[error("{op} is not supported for value type {value_type} with {index_width} indices")]
    NotSupported {
        op: SparseOp,
        value_type: &'static str,
        index_width: IndexWidth,
    },

    #[error("Device is missing required feature: {0}")]
    MissingDeviceFeature(String),

    #[error("Matrix Market error: {0}")]
    MatrixMarket(String),

    #[error("Algorithm did not converge after {iterations} iterations (residual norm {residual_norm:e})")]
    NonConvergence {
        iterations: usize,
        residual_norm: f64,
    },

    /// A failure raised inside a solver stage, tagged with where it happened.
    #[error("{stage} failed on the {backend} backend: {source}")]
    Stage {
        stage: &'static str,
        backend: &'static str,
        #[source]
        source: Box<CgCoreError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CgCoreError {
    /// True when the error (or the error wrapped by a stage) is a "not supported" outcome.
    pub fn is_not_supported(&self) -> bool {
        match self {
            CgCoreError::NotSupported { .. } => true,
            CgCoreError::Stage { source, .. } => source.is_not_supported(),
            _ => false,
        }
    }

    /// Tags the error with the stage and backend it was raised in.
    /// Errors that already carry a stage are returned unchanged.
    pub fn in_stage(self, stage: &'static str, backend: &'static str) -> Self {
        match self {
            CgCoreError::Stage { .. } => self,
            other => CgCoreError::Stage {
                stage,
                backend,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(feature = "wasm")]
impl From<CgCoreError> for wasm_bindgen::JsValue {
    fn from(err: CgCoreError) -> Self {
        Self::from_str(&err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_supported_is_visible_through_stage_wrapper() {
        let err = CgCoreError::NotSupported {
            op: SparseOp::Spmv,
            value_type: "f64",
            index_width: IndexWidth::I64,
        }
        .in_stage("apply", "wgpu");

        assert!(err.is_not_supported());
        let msg = err.to_string();
        assert!(msg.contains("apply failed on the wgpu backend"), "{}", msg);
        assert!(msg.contains("spmv is not supported for value type f64 with 64-bit indices"));
    }

    #[test]
    fn stage_is_not_wrapped_twice() {
        let err = CgCoreError::Internal("boom".to_string())
            .in_stage("step_1", "reference")
            .in_stage("solve", "reference");
        match err {
            CgCoreError::Stage { stage, source, .. } => {
                assert_eq!(stage, "step_1");
                assert!(matches!(*source, CgCoreError::Internal(_)));
            }
            other => panic!("Expected Stage error, got {:?}", other),
        }
    }

    #[test]
    fn device_faults_are_not_not_supported() {
        assert!(!CgCoreError::WgpuError("lost".to_string()).is_not_supported());
    }
}
