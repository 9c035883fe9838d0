use cg_core::{TransferStats, Triplet};
use cg_lsolver::{
    algorithms::{ConjugateGradient, SolveAlgorithm},
    Csr, Dense, GpuDevice, ReferenceDevice,
};
use std::time::Instant;

/// Creates a symmetric pentadiagonal sparse matrix A of size n x n.
/// Diagonals:
/// - Main: 4.0
/// - Adjacent (+1, -1): -1.0
/// - Outer (+2, -2): -0.5
fn create_pentadiagonal_matrix(n: usize) -> Csr<f32, i32> {
    let mut triplets = Vec::new();

    for i in 0..n {
        let mut push = |col: usize, value: f32| {
            triplets.push(Triplet::from_usize(i, col, value).expect("index fits in i32"));
        };
        if i >= 2 {
            push(i - 2, -0.5);
        }
        if i >= 1 {
            push(i - 1, -1.0);
        }
        push(i, 4.0);
        if i + 1 < n {
            push(i + 1, -1.0);
        }
        if i + 2 < n {
            push(i + 2, -0.5);
        }
    }

    Csr::from_triplets(n, n, triplets).expect("Failed to create sparse matrix from triplets")
}

/// Creates an n x k block whose column j holds sin((j + 1) * i / n).
fn create_sin_block(n: usize, k: usize) -> Dense<f32> {
    let mut b = Dense::zeros(n, k);
    for row in 0..n {
        for col in 0..k {
            *b.at_mut(row, col) = ((col + 1) as f32 * row as f32 / n as f32).sin();
        }
    }
    b
}

#[tokio::main]
async fn main() {
    // Initialize logging based on RUST_LOG environment variable
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .init();

    let n = 500;
    let k = 3;
    log::info!(
        "Setting up {}x{} pentadiagonal matrix A and {} sin right-hand sides...",
        n,
        n,
        k
    );

    let a = create_pentadiagonal_matrix(n);
    let b = create_sin_block(n, k);
    let algorithm = ConjugateGradient::with_params(1e-5, n * 5);

    log::info!("Running reference Block CG...");
    let start_time = Instant::now();
    match algorithm.solve(&ReferenceDevice, &a, &b).await {
        Ok(result) => {
            log::info!("  Iterations: {}", result.metadata.iterations);
            log::info!("  Residual norms: {:?}", result.metadata.residual_norms);
            log::info!("  Time elapsed: {:?}", start_time.elapsed());
        }
        Err(e) => log::error!("Reference solver failed: {}", e),
    }

    let gpu_device = match GpuDevice::new().await {
        Ok(device) => device,
        Err(e) => {
            log::error!("No GPU device available: {}", e);
            return;
        }
    };
    let a_gpu = gpu_device.create_csr(&a);

    log::info!("Running wgpu Block CG...");
    gpu_device.reset_transfer_stats();
    let start_time = Instant::now();
    let x_result = algorithm.solve(&gpu_device, &a_gpu, &b).await;
    let duration = start_time.elapsed();

    let TransferStats {
        bytes_to_gpu,
        bytes_from_gpu,
    } = gpu_device.get_transfer_stats();
    log::info!("GPU Transfer Stats:");
    log::info!("  Bytes CPU -> GPU: {}", bytes_to_gpu);
    log::info!("  Bytes GPU -> CPU: {}", bytes_from_gpu);

    match x_result {
        Ok(result) => {
            log::info!("Solver finished successfully!");
            log::info!("  Iterations: {}", result.metadata.iterations);
            log::info!("  Residual norms: {:?}", result.metadata.residual_norms);
            log::info!("  Time elapsed: {:?}", duration);
        }
        Err(e) => log::error!("GPU solver failed: {}", e),
    }
}
