//! CG stages as generated WGSL kernels, one work item per block element.
//!
//! Each stage is a single dispatch. Arithmetic goes through the value prelude
//! of `cg_core::shaders`, which matches the host formulas operation for
//! operation.

use super::check_block;
use bytemuck::{Pod, Zeroable};
use cg_core::ops::{Binding, Kernel, WORKGROUP_SIZE};
use cg_core::shaders::value_prelude;
use cg_core::{CgCoreError, DenseGpu, GpuDevice, ValueKind, ValueType};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct StageParams {
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}

impl StageParams {
    fn new(rows: usize, cols: usize) -> Result<Self, CgCoreError> {
        let fits = |value: usize, what: &str| {
            u32::try_from(value).map_err(|_| {
                CgCoreError::InvalidDimensions(format!("{} ({}) exceeds the 32-bit range", what, value))
            })
        };
        fits(rows * cols, "block elements")?;
        Ok(Self {
            rows: fits(rows, "block rows")?,
            cols: fits(cols, "block columns")?,
            _pad0: 0,
            _pad1: 0,
        })
    }
}

const PARAMS_STRUCT: &str = r#"
struct Params {
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}
"#;

fn initialize_source(kind: ValueKind) -> String {
    format!(
        r#"{prelude}{params}
@group(0) @binding(0) var<storage, read> b: array<V>;
@group(0) @binding(1) var<storage, read_write> r: array<V>;
@group(0) @binding(2) var<storage, read_write> z: array<V>;
@group(0) @binding(3) var<storage, read_write> p: array<V>;
@group(0) @binding(4) var<storage, read_write> q: array<V>;
@group(0) @binding(5) var<storage, read_write> prev_rho: array<V>;
@group(0) @binding(6) var<storage, read_write> rho: array<V>;
@group(0) @binding(7) var<uniform> params: Params;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let idx = flat_index(gid, groups);
    if (idx < params.rows * params.cols) {{
        r[idx] = b[idx];
        z[idx] = v_zero();
        p[idx] = v_zero();
        q[idx] = v_zero();
    }}
    if (idx < params.cols) {{
        prev_rho[idx] = v_one();
        rho[idx] = v_zero();
    }}
}}
"#,
        prelude = value_prelude(kind),
        params = PARAMS_STRUCT,
        wg = WORKGROUP_SIZE,
    )
}

fn step_1_source(kind: ValueKind) -> String {
    format!(
        r#"{prelude}{params}
@group(0) @binding(0) var<storage, read_write> p: array<V>;
@group(0) @binding(1) var<storage, read> z: array<V>;
@group(0) @binding(2) var<storage, read> rho: array<V>;
@group(0) @binding(3) var<storage, read> prev_rho: array<V>;
@group(0) @binding(4) var<uniform> params: Params;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let idx = flat_index(gid, groups);
    if (idx >= params.rows * params.cols) {{
        return;
    }}
    let col = idx % params.cols;
    if (v_is_zero(prev_rho[col])) {{
        return;
    }}
    let tmp = v_div(rho[col], prev_rho[col]);
    p[idx] = z[idx] + v_mul(tmp, p[idx]);
}}
"#,
        prelude = value_prelude(kind),
        params = PARAMS_STRUCT,
        wg = WORKGROUP_SIZE,
    )
}

fn step_2_source(kind: ValueKind) -> String {
    format!(
        r#"{prelude}{params}
@group(0) @binding(0) var<storage, read_write> x: array<V>;
@group(0) @binding(1) var<storage, read_write> r: array<V>;
@group(0) @binding(2) var<storage, read> p: array<V>;
@group(0) @binding(3) var<storage, read> q: array<V>;
@group(0) @binding(4) var<storage, read> beta: array<V>;
@group(0) @binding(5) var<storage, read> rho: array<V>;
@group(0) @binding(6) var<uniform> params: Params;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let idx = flat_index(gid, groups);
    if (idx >= params.rows * params.cols) {{
        return;
    }}
    let col = idx % params.cols;
    if (v_is_zero(beta[col])) {{
        return;
    }}
    let tmp = v_div(rho[col], beta[col]);
    x[idx] = x[idx] + v_mul(tmp, p[idx]);
    r[idx] = r[idx] - v_mul(tmp, q[idx]);
}}
"#,
        prelude = value_prelude(kind),
        params = PARAMS_STRUCT,
        wg = WORKGROUP_SIZE,
    )
}

fn check_owned<V: ValueType>(device: &GpuDevice, blocks: &[(&DenseGpu<V>, &str)]) -> Result<(), CgCoreError> {
    blocks
        .iter()
        .try_for_each(|(block, name)| device.check_owned(block, name))
}

#[allow(clippy::too_many_arguments)]
pub fn initialize<V: ValueType>(
    device: &GpuDevice,
    b: &DenseGpu<V>,
    r: &mut DenseGpu<V>,
    z: &mut DenseGpu<V>,
    p: &mut DenseGpu<V>,
    q: &mut DenseGpu<V>,
    prev_rho: &mut DenseGpu<V>,
    rho: &mut DenseGpu<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (b.rows(), b.cols());
    check_block(r, "r", rows, cols)?;
    check_block(z, "z", rows, cols)?;
    check_block(p, "p", rows, cols)?;
    check_block(q, "q", rows, cols)?;
    check_block(prev_rho, "prev_rho", cols, 1)?;
    check_block(rho, "rho", cols, 1)?;
    check_owned(
        device,
        &[
            (b, "b"),
            (&*r, "r"),
            (&*z, "z"),
            (&*p, "p"),
            (&*q, "q"),
            (&*prev_rho, "prev_rho"),
            (&*rho, "rho"),
        ],
    )?;

    let params = StageParams::new(rows, cols)?;
    let name = format!("cg_initialize_{}", V::KIND.suffix());
    device.launch(
        &Kernel {
            name: &name,
            entry_point: "main",
            kind: V::KIND,
        },
        || initialize_source(V::KIND),
        &[
            Binding::read(b.buffer()),
            Binding::write(r.buffer()),
            Binding::write(z.buffer()),
            Binding::write(p.buffer()),
            Binding::write(q.buffer()),
            Binding::write(prev_rho.buffer()),
            Binding::write(rho.buffer()),
        ],
        bytemuck::bytes_of(&params),
        (rows * cols).max(cols),
    )
}

pub fn step_1<V: ValueType>(
    device: &GpuDevice,
    p: &mut DenseGpu<V>,
    z: &DenseGpu<V>,
    rho: &DenseGpu<V>,
    prev_rho: &DenseGpu<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (p.rows(), p.cols());
    check_block(z, "z", rows, cols)?;
    check_block(rho, "rho", cols, 1)?;
    check_block(prev_rho, "prev_rho", cols, 1)?;
    check_owned(device, &[(&*p, "p"), (z, "z"), (rho, "rho"), (prev_rho, "prev_rho")])?;

    let params = StageParams::new(rows, cols)?;
    let name = format!("cg_step_1_{}", V::KIND.suffix());
    device.launch(
        &Kernel {
            name: &name,
            entry_point: "main",
            kind: V::KIND,
        },
        || step_1_source(V::KIND),
        &[
            Binding::write(p.buffer()),
            Binding::read(z.buffer()),
            Binding::read(rho.buffer()),
            Binding::read(prev_rho.buffer()),
        ],
        bytemuck::bytes_of(&params),
        rows * cols,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn step_2<V: ValueType>(
    device: &GpuDevice,
    x: &mut DenseGpu<V>,
    r: &mut DenseGpu<V>,
    p: &DenseGpu<V>,
    q: &DenseGpu<V>,
    beta: &DenseGpu<V>,
    rho: &DenseGpu<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (x.rows(), x.cols());
    check_block(r, "r", rows, cols)?;
    check_block(p, "p", rows, cols)?;
    check_block(q, "q", rows, cols)?;
    check_block(beta, "beta", cols, 1)?;
    check_block(rho, "rho", cols, 1)?;
    check_owned(
        device,
        &[(&*x, "x"), (&*r, "r"), (p, "p"), (q, "q"), (beta, "beta"), (rho, "rho")],
    )?;

    let params = StageParams::new(rows, cols)?;
    let name = format!("cg_step_2_{}", V::KIND.suffix());
    device.launch(
        &Kernel {
            name: &name,
            entry_point: "main",
            kind: V::KIND,
        },
        || step_2_source(V::KIND),
        &[
            Binding::write(x.buffer()),
            Binding::write(r.buffer()),
            Binding::read(p.buffer()),
            Binding::read(q.buffer()),
            Binding::read(beta.buffer()),
            Binding::read(rho.buffer()),
        ],
        bytemuck::bytes_of(&params),
        rows * cols,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_params_fill_one_uniform_slot() {
        assert_eq!(std::mem::size_of::<StageParams>(), 16);
        assert!(StageParams::new(1 << 20, 1 << 13).is_err());
    }

    #[test]
    fn stages_guard_on_exact_zero() {
        let step_1 = step_1_source(ValueKind::Complex64);
        assert!(step_1.contains("if (v_is_zero(prev_rho[col]))"));
        assert!(step_1.contains("p[idx] = z[idx] + v_mul(tmp, p[idx]);"));

        let step_2 = step_2_source(ValueKind::Real32);
        assert!(step_2.contains("if (v_is_zero(beta[col]))"));
        assert!(step_2.contains("@binding(6) var<uniform> params"));
    }

    #[test]
    fn initialize_binds_seven_blocks() {
        let src = initialize_source(ValueKind::Real64);
        assert!(src.contains("@binding(7) var<uniform> params"));
        assert!(src.contains("prev_rho[idx] = v_one();"));
    }
}
