#![allow(dead_code)]

use cg_core::{Csr, Triplet};
use cg_lsolver::{Dense, Device, GpuDevice, ValueType};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A device for accelerator tests, or `None` when the machine has no adapter.
pub fn gpu_device() -> Option<GpuDevice> {
    init_logger();
    if GpuDevice::get_num_devices() == 0 {
        eprintln!("No wgpu adapter available, skipping");
        return None;
    }
    match GpuDevice::new_blocking() {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("Could not create a wgpu device ({}), skipping", err);
            None
        }
    }
}

/// Like [`gpu_device`], but also requires double precision shader support.
pub fn gpu_device_f64() -> Option<GpuDevice> {
    let device = gpu_device()?;
    if !device.supports_f64() {
        eprintln!("Adapter lacks SHADER_F64, skipping");
        return None;
    }
    Some(device)
}

/// Block with entries in [-1, 1) (both parts for complex types).
pub fn random_block<V: ValueType>(rng: &mut fastrand::Rng, rows: usize, cols: usize) -> Dense<V> {
    let values = (0..rows * cols)
        .map(|_| V::from_parts(rng.f64() * 2.0 - 1.0, rng.f64() * 2.0 - 1.0))
        .collect();
    Dense::from_values(rows, cols, values).unwrap()
}

/// `n x 1` block of per-column scalars with magnitude in [0.5, 1.5).
pub fn random_scalars<V: ValueType>(rng: &mut fastrand::Rng, n: usize) -> Dense<V> {
    let mut component = || {
        let magnitude = rng.f64() + 0.5;
        if rng.bool() {
            magnitude
        } else {
            -magnitude
        }
    };
    let values = (0..n)
        .map(|_| {
            let re = component();
            let im = component();
            V::from_parts(re, im)
        })
        .collect();
    Dense::from_values(n, 1, values).unwrap()
}

pub fn assert_close<V: ValueType>(actual: &Dense<V>, expected: &Dense<V>, tolerance: f64) {
    assert_eq!(actual.rows(), expected.rows(), "Row counts differ");
    assert_eq!(actual.cols(), expected.cols(), "Column counts differ");
    for (i, (a, b)) in actual.values().iter().zip(expected.values()).enumerate() {
        let diff = (*a - *b).magnitude();
        assert!(
            diff <= tolerance,
            "Mismatch at element {}: expected {:?}, got {:?}, diff {:e}",
            i,
            b,
            a,
            diff
        );
    }
}

/// 1D Laplacian `tridiag(-1, 2, -1)` plus `shift` on the diagonal.
pub fn laplacian<V: ValueType>(n: usize, shift: f64) -> Csr<V, i32> {
    let mut triplets = Vec::new();
    for i in 0..n {
        if i > 0 {
            triplets.push(Triplet::from_usize(i, i - 1, V::from_parts(-1.0, 0.0)).unwrap());
        }
        triplets.push(Triplet::from_usize(i, i, V::from_parts(2.0 + shift, 0.0)).unwrap());
        if i + 1 < n {
            triplets.push(Triplet::from_usize(i, i + 1, V::from_parts(-1.0, 0.0)).unwrap());
        }
    }
    Csr::from_triplets(n, n, triplets).unwrap()
}
