use cg_core::{CgCoreError, Dense, Matrix, ValueType};
use log::{debug, info, warn};

use super::cg::LinearOperator;
use super::{ConjugateGradient, SolveAlgorithm, SolveResult};

#[derive(Debug, Clone, PartialEq)]
pub struct CgMetadata {
    pub iterations: usize,
    /// Final residual norm of every column.
    pub residual_norms: Vec<f64>,
}

impl<D, M, V> SolveAlgorithm<D, M, V> for ConjugateGradient
where
    V: ValueType,
    M: Matrix<Value = V>,
    D: LinearOperator<V, M>,
{
    type Metadata = CgMetadata;

    async fn solve(&self, device: &D, a: &M, b: &Dense<V>) -> Result<SolveResult<V, CgMetadata>, CgCoreError> {
        <Self as SolveAlgorithm<D, M, V>>::validate_inputs(self, a, b)?;

        let backend = device.backend_name();
        let stage = |name: &'static str| move |err: CgCoreError| err.in_stage(name, backend);
        let (m, n) = (b.rows(), b.cols());
        info!(
            "Block CG on the {} backend: {}x{} system, {} right-hand side(s)",
            backend, m, m, n
        );

        let b_norms = b.compute_norm2();
        let b_dev = device.upload(b).map_err(stage("upload"))?;
        let mut x = device.create_block(m, n);
        let mut r = device.create_block(m, n);
        let mut z = device.create_block(m, n);
        let mut p = device.create_block(m, n);
        let mut q = device.create_block(m, n);
        let mut prev_rho = device.create_block(n, 1);
        let mut rho = device.create_block(n, 1);
        let mut beta = device.create_block(n, 1);

        device
            .initialize(&b_dev, &mut r, &mut z, &mut p, &mut q, &mut prev_rho, &mut rho)
            .map_err(stage("initialize"))?;
        // r := b - A x
        device
            .apply(-V::one(), a, &x, V::one(), &mut r)
            .map_err(stage("apply"))?;

        let mut iterations = 0;
        loop {
            // No preconditioner: z := r
            device.copy_block(&r, &mut z).map_err(stage("copy"))?;
            device.dot(&r, &z, &mut rho).map_err(stage("dot"))?;

            let rho_host = device.download(&rho).await.map_err(stage("download"))?;
            let residual_norms: Vec<f64> = rho_host
                .values()
                .iter()
                .map(|value| value.magnitude().sqrt())
                .collect();
            let converged = residual_norms
                .iter()
                .zip(&b_norms)
                .all(|(res, b_norm)| *b_norm == 0.0 || *res <= self.tolerance * b_norm);
            debug!("Iteration {}: residual norms = {:?}", iterations, residual_norms);

            if converged {
                info!("CG converged in {} iterations.", iterations);
                let x = device.download(&x).await.map_err(stage("download"))?;
                return Ok(SolveResult {
                    x,
                    metadata: CgMetadata {
                        iterations,
                        residual_norms,
                    },
                });
            }
            if iterations >= self.max_iterations {
                let residual_norm = residual_norms.iter().copied().fold(0.0, f64::max);
                warn!(
                    "CG reached maximum iterations ({}) without converging.",
                    self.max_iterations
                );
                return Err(CgCoreError::NonConvergence {
                    iterations,
                    residual_norm,
                });
            }

            device
                .step_1(&mut p, &z, &rho, &prev_rho)
                .map_err(stage("step_1"))?;
            device
                .apply(V::one(), a, &p, V::zero(), &mut q)
                .map_err(stage("apply"))?;
            device.dot(&p, &q, &mut beta).map_err(stage("dot"))?;
            device
                .step_2(&mut x, &mut r, &p, &q, &beta, &rho)
                .map_err(stage("step_2"))?;

            std::mem::swap(&mut prev_rho, &mut rho);
            iterations += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::{Csr, ReferenceDevice};

    #[test]
    fn solves_scaled_identity_in_one_iteration() {
        let a = Csr::<f64, i32>::from_csr(2, 2, vec![2.0, 2.0], vec![0, 1], vec![0, 1, 2]).unwrap();
        let b = Dense::from_values(2, 2, vec![2.0, 1.0, 4.0, 8.0]).unwrap();

        let result = pollster::block_on(ConjugateGradient::new().solve(&ReferenceDevice, &a, &b)).unwrap();
        assert_eq!(result.x.values(), &[1.0, 0.5, 2.0, 4.0]);
        assert_eq!(result.metadata.iterations, 1);

        let short = Dense::<f64>::zeros(3, 1);
        let err = pollster::block_on(ConjugateGradient::new().solve(&ReferenceDevice, &a, &short));
        assert!(matches!(err, Err(CgCoreError::InvalidDimensions(_))));
    }
}
