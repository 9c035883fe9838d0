//! WGSL generation helpers.
//!
//! Every generated kernel starts with [`value_prelude`], which defines the
//! element alias `V` and the arithmetic used on it. Complex products and
//! quotients follow `num_complex` exactly, so host and device perform the same
//! floating point operations in the same order.

use crate::ops::WORKGROUP_SIZE;
use crate::value::ValueKind;

fn literal(kind: ValueKind, value: &str) -> String {
    if kind.is_double() {
        format!("{}lf", value)
    } else {
        format!("{}f", value)
    }
}

/// Type alias, constructors and arithmetic for the element type `kind`,
/// plus the dispatch helpers shared by all kernels.
pub fn value_prelude(kind: ValueKind) -> String {
    let zero = literal(kind, "0.0");
    let one = literal(kind, "1.0");
    let ty = kind.wgsl_type();

    let arithmetic = if kind.is_complex() {
        format!(
            r#"
alias V = {ty};

fn v_zero() -> V {{ return V({zero}, {zero}); }}
fn v_one() -> V {{ return V({one}, {zero}); }}
fn v_mul(a: V, b: V) -> V {{
    return V(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x);
}}
fn v_div(a: V, b: V) -> V {{
    let d = b.x * b.x + b.y * b.y;
    return V((a.x * b.x + a.y * b.y) / d, (a.y * b.x - a.x * b.y) / d);
}}
fn v_conj(a: V) -> V {{ return V(a.x, -a.y); }}
fn v_is_zero(a: V) -> bool {{ return a.x == {zero} && a.y == {zero}; }}
"#
        )
    } else {
        format!(
            r#"
alias V = {ty};

fn v_zero() -> V {{ return {zero}; }}
fn v_one() -> V {{ return {one}; }}
fn v_mul(a: V, b: V) -> V {{ return a * b; }}
fn v_div(a: V, b: V) -> V {{ return a / b; }}
fn v_conj(a: V) -> V {{ return a; }}
fn v_is_zero(a: V) -> bool {{ return a == {zero}; }}
"#
        )
    };

    format!(
        r#"// element type: {name}
const WORKGROUP_SIZE: u32 = {wg}u;

fn flat_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {{
    return gid.y * groups.x * WORKGROUP_SIZE + gid.x;
}}
{arithmetic}"#,
        name = kind.suffix(),
        wg = WORKGROUP_SIZE,
    )
}

/// Per-column `conj(x[:, j]) . y[:, j]`, one thread per column, rows summed in order.
pub(crate) fn column_dot(kind: ValueKind) -> String {
    format!(
        r#"{prelude}
struct Params {{
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}}

@group(0) @binding(0) var<storage, read> x: array<V>;
@group(0) @binding(1) var<storage, read> y: array<V>;
@group(0) @binding(2) var<storage, read_write> result: array<V>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let col = flat_index(gid, groups);
    if (col >= params.cols) {{
        return;
    }}
    var sum = v_zero();
    for (var row = 0u; row < params.rows; row = row + 1u) {{
        let idx = row * params.cols + col;
        sum = sum + v_mul(v_conj(x[idx]), y[idx]);
    }}
    result[col] = sum;
}}
"#,
        prelude = value_prelude(kind),
        wg = WORKGROUP_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_precision_literals_use_lf_suffix() {
        let src = value_prelude(ValueKind::Real64);
        assert!(src.contains("alias V = f64;"));
        assert!(src.contains("return 0.0lf;"));
        assert!(!src.contains("0.0f;"));
    }

    #[test]
    fn complex_prelude_uses_vec2() {
        let src = value_prelude(ValueKind::Complex32);
        assert!(src.contains("alias V = vec2<f32>;"));
        assert!(src.contains("fn v_div(a: V, b: V) -> V"));
        assert!(src.contains("V(1.0f, 0.0f)"));
    }

    #[test]
    fn dot_kernel_embeds_prelude() {
        let src = column_dot(ValueKind::Complex64);
        assert!(src.contains("alias V = vec2<f64>;"));
        assert!(src.contains("@workgroup_size(256)"));
        assert!(src.contains("v_conj(x[idx])"));
    }
}
