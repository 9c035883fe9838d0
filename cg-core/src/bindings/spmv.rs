use super::{check_supported, to_u32, MatDescr, Operation, Scalar, SparseHandle, SparseOp};
use crate::dense_gpu::DenseGpu;
use crate::error::CgCoreError;
use crate::ops::{Binding, Kernel, WORKGROUP_SIZE};
use crate::shaders::value_prelude;
use crate::sparse_matrix::CsrGpu;
use crate::value::{IndexType, ValueKind, ValueType};
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpmvParams {
    out_rows: u32,
    rows: u32,
    k: u32,
    base: u32,
}

fn spmv_source(kind: ValueKind) -> String {
    format!(
        r#"{prelude}
struct Params {{
    out_rows: u32,
    rows: u32,
    k: u32,
    base: u32,
}}

@group(0) @binding(0) var<storage, read> row_ptrs: array<i32>;
@group(0) @binding(1) var<storage, read> col_idxs: array<i32>;
@group(0) @binding(2) var<storage, read> values: array<V>;
@group(0) @binding(3) var<storage, read> x: array<V>;
@group(0) @binding(4) var<storage, read> alpha: array<V>;
@group(0) @binding(5) var<storage, read> beta: array<V>;
@group(0) @binding(6) var<storage, read_write> y: array<V>;
@group(0) @binding(7) var<uniform> params: Params;

fn store(idx: u32, sum: V) {{
    var out = v_mul(alpha[0], sum);
    if (!v_is_zero(beta[0])) {{
        out = out + v_mul(beta[0], y[idx]);
    }}
    y[idx] = out;
}}

// One thread per element of y; products summed in stored order.
@compute @workgroup_size({wg})
fn spmv(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let idx = flat_index(gid, groups);
    if (idx >= params.out_rows * params.k) {{
        return;
    }}
    let row = idx / params.k;
    let j = idx % params.k;
    let base = i32(params.base);
    var sum = v_zero();
    for (var e = row_ptrs[row] - base; e < row_ptrs[row + 1u] - base; e = e + 1) {{
        let col = u32(col_idxs[e] - base);
        sum = sum + v_mul(values[e], x[col * params.k + j]);
    }}
    store(idx, sum);
}}

// One thread per element of y; rows of A visited in ascending order.
@compute @workgroup_size({wg})
fn spmv_transposed(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let idx = flat_index(gid, groups);
    if (idx >= params.out_rows * params.k) {{
        return;
    }}
    let wanted = i32(idx / params.k) + i32(params.base);
    let j = idx % params.k;
    let base = i32(params.base);
    var sum = v_zero();
    for (var row = 0u; row < params.rows; row = row + 1u) {{
        for (var e = row_ptrs[row] - base; e < row_ptrs[row + 1u] - base; e = e + 1) {{
            if (col_idxs[e] == wanted) {{
                sum = sum + v_mul(values[e], x[row * params.k + j]);
            }}
        }}
    }}
    store(idx, sum);
}}
"#,
        prelude = value_prelude(kind),
        wg = WORKGROUP_SIZE,
    )
}

/// Sparse matrix times dense block: `y := alpha * op(A) * x + beta * y`.
///
/// Every column of `x` is an independent vector. `y` is not read when `beta`
/// is zero. Index base comes from `descr`.
#[allow(clippy::too_many_arguments)]
pub fn spmv<V: ValueType, I: IndexType>(
    handle: &SparseHandle,
    op: Operation,
    alpha: Scalar<'_, V>,
    descr: &MatDescr,
    a: &CsrGpu<V, I>,
    x: &DenseGpu<V>,
    beta: Scalar<'_, V>,
    y: &mut DenseGpu<V>,
) -> Result<(), CgCoreError> {
    check_supported::<V, I>(SparseOp::Spmv)?;

    handle.check_owner(&a.context, "matrix")?;
    handle.check_owner(&x.context, "x")?;
    handle.check_owner(&y.context, "y")?;

    let (out_rows, in_rows) = match op {
        Operation::NonTranspose => (a.rows(), a.cols()),
        Operation::Transpose => (a.cols(), a.rows()),
    };
    if x.rows() != in_rows || y.rows() != out_rows || x.cols() != y.cols() {
        return Err(CgCoreError::InvalidDimensions(format!(
            "spmv with {:?} of a {}x{} matrix: x is {}x{}, y is {}x{}",
            op,
            a.rows(),
            a.cols(),
            x.rows(),
            x.cols(),
            y.rows(),
            y.cols()
        )));
    }

    let alpha = alpha.resolve(handle, &a.context, "alpha")?;
    let beta = beta.resolve(handle, &a.context, "beta")?;

    let params = SpmvParams {
        out_rows: to_u32(out_rows, "output rows")?,
        rows: to_u32(a.rows(), "matrix rows")?,
        k: to_u32(x.cols(), "block columns")?,
        base: descr.index_base().offset(),
    };
    to_u32(out_rows * x.cols(), "output elements")?;

    let name = format!("spmv_{}", V::KIND.suffix());
    let entry_point = match op {
        Operation::NonTranspose => "spmv",
        Operation::Transpose => "spmv_transposed",
    };
    handle.launcher().launch(
        &Kernel {
            name: &name,
            entry_point,
            kind: V::KIND,
        },
        || spmv_source(V::KIND),
        &[
            Binding::read(a.row_ptrs_buffer()),
            Binding::read(a.col_idxs_buffer()),
            Binding::read(a.values_buffer()),
            Binding::read(x.buffer()),
            Binding::read(alpha.buffer()),
            Binding::read(beta.buffer()),
            Binding::write(y.buffer()),
        ],
        bytemuck::bytes_of(&params),
        out_rows * x.cols(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_has_both_entry_points() {
        let src = spmv_source(ValueKind::Real32);
        assert!(src.contains("fn spmv("));
        assert!(src.contains("fn spmv_transposed("));
        assert!(src.contains("@binding(7) var<uniform> params"));
    }

    #[test]
    fn params_fill_one_uniform_slot() {
        assert_eq!(std::mem::size_of::<SpmvParams>(), 16);
    }
}
