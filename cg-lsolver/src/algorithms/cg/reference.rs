//! Sequential CG stages on host blocks.

use super::check_block;
use cg_core::{CgCoreError, Dense, ReferenceDevice, ValueType};

#[allow(clippy::too_many_arguments)]
pub fn initialize<V: ValueType>(
    _device: &ReferenceDevice,
    b: &Dense<V>,
    r: &mut Dense<V>,
    z: &mut Dense<V>,
    p: &mut Dense<V>,
    q: &mut Dense<V>,
    prev_rho: &mut Dense<V>,
    rho: &mut Dense<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (b.rows(), b.cols());
    check_block(r, "r", rows, cols)?;
    check_block(z, "z", rows, cols)?;
    check_block(p, "p", rows, cols)?;
    check_block(q, "q", rows, cols)?;
    check_block(prev_rho, "prev_rho", cols, 1)?;
    check_block(rho, "rho", cols, 1)?;

    r.values_mut().copy_from_slice(b.values());
    z.fill(V::zero());
    p.fill(V::zero());
    q.fill(V::zero());
    prev_rho.fill(V::one());
    rho.fill(V::zero());
    Ok(())
}

pub fn step_1<V: ValueType>(
    _device: &ReferenceDevice,
    p: &mut Dense<V>,
    z: &Dense<V>,
    rho: &Dense<V>,
    prev_rho: &Dense<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (p.rows(), p.cols());
    check_block(z, "z", rows, cols)?;
    check_block(rho, "rho", cols, 1)?;
    check_block(prev_rho, "prev_rho", cols, 1)?;

    for row in 0..rows {
        for col in 0..cols {
            let prev = prev_rho.at(col, 0);
            if prev.is_zero() {
                continue;
            }
            let tmp = rho.at(col, 0) / prev;
            let p_ij = p.at_mut(row, col);
            *p_ij = z.at(row, col) + tmp * *p_ij;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn step_2<V: ValueType>(
    _device: &ReferenceDevice,
    x: &mut Dense<V>,
    r: &mut Dense<V>,
    p: &Dense<V>,
    q: &Dense<V>,
    beta: &Dense<V>,
    rho: &Dense<V>,
) -> Result<(), CgCoreError> {
    let (rows, cols) = (x.rows(), x.cols());
    check_block(r, "r", rows, cols)?;
    check_block(p, "p", rows, cols)?;
    check_block(q, "q", rows, cols)?;
    check_block(beta, "beta", cols, 1)?;
    check_block(rho, "rho", cols, 1)?;

    for row in 0..rows {
        for col in 0..cols {
            let b = beta.at(col, 0);
            if b.is_zero() {
                continue;
            }
            let tmp = rho.at(col, 0) / b;
            let x_ij = x.at_mut(row, col);
            *x_ij = *x_ij + tmp * p.at(row, col);
            let r_ij = r.at_mut(row, col);
            *r_ij = *r_ij - tmp * q.at(row, col);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(rows: usize, cols: usize, values: &[f64]) -> Dense<f64> {
        Dense::from_values(rows, cols, values.to_vec()).unwrap()
    }

    #[test]
    fn initialize_resets_every_block() {
        let b = block(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let mut r = block(2, 2, &[9.0; 4]);
        let mut z = r.clone();
        let mut p = r.clone();
        let mut q = r.clone();
        let mut prev_rho = block(2, 1, &[5.0, 5.0]);
        let mut rho = prev_rho.clone();

        initialize(&ReferenceDevice, &b, &mut r, &mut z, &mut p, &mut q, &mut prev_rho, &mut rho).unwrap();

        assert_eq!(r, b);
        for zeroed in [&z, &p, &q] {
            assert!(zeroed.values().iter().all(|v| *v == 0.0));
        }
        assert_eq!(prev_rho.values(), &[1.0, 1.0]);
        assert_eq!(rho.values(), &[0.0, 0.0]);
    }

    #[test]
    fn step_1_skips_columns_with_zero_prev_rho() {
        let mut p = block(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        let z = block(2, 2, &[10.0, 10.0, 20.0, 20.0]);
        let rho = block(2, 1, &[4.0, 4.0]);
        let prev_rho = block(2, 1, &[2.0, 0.0]);

        step_1(&ReferenceDevice, &mut p, &z, &rho, &prev_rho).unwrap();

        // column 0: z + 2 * p, column 1 untouched
        assert_eq!(p.values(), &[12.0, 1.0, 24.0, 2.0]);
    }

    #[test]
    fn step_2_skips_columns_with_zero_beta() {
        let mut x = block(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let mut r = block(2, 2, &[5.0, 5.0, 5.0, 5.0]);
        let p = block(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        let q = block(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let beta = block(2, 1, &[0.0, 2.0]);
        let rho = block(2, 1, &[3.0, 4.0]);

        step_2(&ReferenceDevice, &mut x, &mut r, &p, &q, &beta, &rho).unwrap();

        // column 1: tmp = 2
        assert_eq!(x.values(), &[1.0, 3.0, 1.0, 5.0]);
        assert_eq!(r.values(), &[5.0, 3.0, 5.0, 3.0]);
    }

    #[test]
    fn mismatched_blocks_are_rejected() {
        let mut p = Dense::<f64>::zeros(3, 2);
        let z = Dense::zeros(3, 2);
        let rho = Dense::zeros(3, 1);
        let prev_rho = Dense::zeros(2, 1);
        let err = step_1(&ReferenceDevice, &mut p, &z, &rho, &prev_rho).unwrap_err();
        assert!(matches!(err, CgCoreError::InvalidDimensions(_)));
    }
}
