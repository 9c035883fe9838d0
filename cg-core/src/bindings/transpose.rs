use super::{check_supported, not_supported, to_u32, Action, IndexBase, SparseHandle, SparseOp};
use crate::error::CgCoreError;
use crate::ops::{Binding, Kernel, WORKGROUP_SIZE};
use crate::shaders::value_prelude;
use crate::sparse_matrix::CsrGpu;
use crate::value::{IndexType, ValueKind, ValueType};
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TransposeParams {
    rows: u32,
    cols: u32,
    base: u32,
    numeric: u32,
}

// Three passes: count entries per column, prefix sum on a single thread,
// then fill each output row by scanning the original rows in order.
fn transpose_source(kind: ValueKind) -> String {
    format!(
        r#"{prelude}
struct Params {{
    rows: u32,
    cols: u32,
    base: u32,
    numeric: u32,
}}

@group(0) @binding(0) var<storage, read> row_ptrs: array<i32>;
@group(0) @binding(1) var<storage, read> col_idxs: array<i32>;
@group(0) @binding(2) var<storage, read> values: array<V>;
@group(0) @binding(3) var<storage, read_write> trans_row_ptrs: array<i32>;
@group(0) @binding(4) var<storage, read_write> trans_col_idxs: array<i32>;
@group(0) @binding(5) var<storage, read_write> trans_values: array<V>;
@group(0) @binding(6) var<uniform> params: Params;

@compute @workgroup_size({wg})
fn count(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let col = flat_index(gid, groups);
    if (col >= params.cols) {{
        return;
    }}
    let base = i32(params.base);
    let wanted = i32(col) + base;
    let nnz = row_ptrs[params.rows] - base;
    var n = 0;
    for (var e = 0; e < nnz; e = e + 1) {{
        if (col_idxs[e] == wanted) {{
            n = n + 1;
        }}
    }}
    trans_row_ptrs[col + 1u] = n;
}}

@compute @workgroup_size({wg})
fn scan(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    if (flat_index(gid, groups) != 0u) {{
        return;
    }}
    trans_row_ptrs[0] = i32(params.base);
    for (var col = 0u; col < params.cols; col = col + 1u) {{
        trans_row_ptrs[col + 1u] = trans_row_ptrs[col] + trans_row_ptrs[col + 1u];
    }}
}}

@compute @workgroup_size({wg})
fn fill(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let col = flat_index(gid, groups);
    if (col >= params.cols) {{
        return;
    }}
    let base = i32(params.base);
    let wanted = i32(col) + base;
    var pos = trans_row_ptrs[col] - base;
    for (var row = 0u; row < params.rows; row = row + 1u) {{
        for (var e = row_ptrs[row] - base; e < row_ptrs[row + 1u] - base; e = e + 1) {{
            if (col_idxs[e] == wanted) {{
                trans_col_idxs[pos] = i32(row) + base;
                if (params.numeric != 0u) {{
                    trans_values[pos] = values[e];
                }}
                pos = pos + 1;
            }}
        }}
    }}
}}
"#,
        prelude = value_prelude(kind),
        wg = WORKGROUP_SIZE,
    )
}

fn check_shapes<V: ValueType, I: IndexType>(
    orig: &CsrGpu<V, I>,
    trans: &CsrGpu<V, I>,
) -> Result<(), CgCoreError> {
    if trans.rows() != orig.cols() || trans.cols() != orig.rows() || trans.nnz() != orig.nnz() {
        return Err(CgCoreError::InvalidDimensions(format!(
            "Transpose of a {}x{} matrix with {} entries needs a {}x{} output with {} entries, got {}x{} with {}",
            orig.rows(),
            orig.cols(),
            orig.nnz(),
            orig.cols(),
            orig.rows(),
            orig.nnz(),
            trans.rows(),
            trans.cols(),
            trans.nnz()
        )));
    }
    Ok(())
}

/// Writes the transpose of `orig` (equivalently its CSC form) into `trans`.
///
/// `trans` must be allocated as `cols x rows` with the same number of
/// entries. With [`Action::Symbolic`] only the sparsity pattern is written.
/// Within each output row, entries are ordered by ascending original row.
/// `index_base` applies to both input and output indices.
pub fn transpose<V: ValueType, I: IndexType>(
    handle: &SparseHandle,
    orig: &CsrGpu<V, I>,
    trans: &mut CsrGpu<V, I>,
    action: Action,
    index_base: IndexBase,
) -> Result<(), CgCoreError> {
    check_supported::<V, I>(SparseOp::Transpose)?;

    handle.check_owner(&orig.context, "original matrix")?;
    handle.check_owner(&trans.context, "transposed matrix")?;
    check_shapes(orig, trans)?;

    let params = TransposeParams {
        rows: to_u32(orig.rows(), "matrix rows")?,
        cols: to_u32(orig.cols(), "matrix columns")?,
        base: index_base.offset(),
        numeric: u32::from(action == Action::Numeric),
    };
    let name = format!("transpose_{}", V::KIND.suffix());
    let bindings = [
        Binding::read(orig.row_ptrs_buffer()),
        Binding::read(orig.col_idxs_buffer()),
        Binding::read(orig.values_buffer()),
        Binding::write(trans.row_ptrs_buffer()),
        Binding::write(trans.col_idxs_buffer()),
        Binding::write(trans.values_buffer()),
    ];

    for (entry_point, work_items) in [("count", orig.cols()), ("scan", 1), ("fill", orig.cols())] {
        handle.launcher().launch(
            &Kernel {
                name: &name,
                entry_point,
                kind: V::KIND,
            },
            || transpose_source(V::KIND),
            &bindings,
            bytemuck::bytes_of(&params),
            work_items,
        )?;
    }
    Ok(())
}

/// Conjugate transpose. The sparse library has no routine for it at any
/// value type or index width, so this always returns `NotSupported`.
pub fn conj_transpose<V: ValueType, I: IndexType>(
    _handle: &SparseHandle,
    _orig: &CsrGpu<V, I>,
    _trans: &mut CsrGpu<V, I>,
    _action: Action,
    _index_base: IndexBase,
) -> Result<(), CgCoreError> {
    Err(not_supported::<V, I>(SparseOp::ConjTranspose))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_has_three_passes() {
        let src = transpose_source(ValueKind::Real64);
        for entry in ["fn count(", "fn scan(", "fn fill("] {
            assert!(src.contains(entry), "missing {}", entry);
        }
        assert!(src.contains("alias V = f64;"));
    }
}
