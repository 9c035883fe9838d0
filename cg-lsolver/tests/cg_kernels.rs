use cg_lsolver::algorithms::cg::{gpu, reference, CgKernels};
use cg_lsolver::{CgCoreError, Complex64, Dense, DenseGpu, GpuDevice, ReferenceDevice, ValueType};
use pollster::block_on;

mod common;

const ROWS: usize = 24;
const COLS: usize = 7;
const TOLERANCE: f64 = 1e-14;

/// The blocks of one CG iteration, held on the host.
#[derive(Clone)]
struct Blocks<V: ValueType> {
    b: Dense<V>,
    x: Dense<V>,
    r: Dense<V>,
    z: Dense<V>,
    p: Dense<V>,
    q: Dense<V>,
    prev_rho: Dense<V>,
    rho: Dense<V>,
    beta: Dense<V>,
}

impl<V: ValueType> Blocks<V> {
    fn random(rng: &mut fastrand::Rng) -> Self {
        Self {
            b: common::random_block(rng, ROWS, COLS),
            x: common::random_block(rng, ROWS, COLS),
            r: common::random_block(rng, ROWS, COLS),
            z: common::random_block(rng, ROWS, COLS),
            p: common::random_block(rng, ROWS, COLS),
            q: common::random_block(rng, ROWS, COLS),
            prev_rho: common::random_scalars(rng, COLS),
            rho: common::random_scalars(rng, COLS),
            beta: common::random_scalars(rng, COLS),
        }
    }
}

/// The same blocks mirrored on the accelerator.
struct GpuBlocks<V: ValueType> {
    b: DenseGpu<V>,
    x: DenseGpu<V>,
    r: DenseGpu<V>,
    z: DenseGpu<V>,
    p: DenseGpu<V>,
    q: DenseGpu<V>,
    prev_rho: DenseGpu<V>,
    rho: DenseGpu<V>,
    beta: DenseGpu<V>,
}

impl<V: ValueType> GpuBlocks<V> {
    fn mirror(device: &GpuDevice, host: &Blocks<V>) -> Self {
        let upload = |block: &Dense<V>| {
            let mut gpu = DenseGpu::create(device, 0, 0);
            gpu.copy_from(block).unwrap();
            gpu
        };
        Self {
            b: upload(&host.b),
            x: upload(&host.x),
            r: upload(&host.r),
            z: upload(&host.z),
            p: upload(&host.p),
            q: upload(&host.q),
            prev_rho: upload(&host.prev_rho),
            rho: upload(&host.rho),
            beta: upload(&host.beta),
        }
    }

    fn download(&self) -> Blocks<V> {
        let read = |block: &DenseGpu<V>| {
            let mut host = Dense::create(&ReferenceDevice, 0, 0);
            block_on(host.copy_from_gpu(block)).unwrap();
            host
        };
        Blocks {
            b: read(&self.b),
            x: read(&self.x),
            r: read(&self.r),
            z: read(&self.z),
            p: read(&self.p),
            q: read(&self.q),
            prev_rho: read(&self.prev_rho),
            rho: read(&self.rho),
            beta: read(&self.beta),
        }
    }
}

fn assert_all_close<V: ValueType>(actual: &Blocks<V>, expected: &Blocks<V>, tolerance: f64) {
    common::assert_close(&actual.b, &expected.b, tolerance);
    common::assert_close(&actual.x, &expected.x, tolerance);
    common::assert_close(&actual.r, &expected.r, tolerance);
    common::assert_close(&actual.z, &expected.z, tolerance);
    common::assert_close(&actual.p, &expected.p, tolerance);
    common::assert_close(&actual.q, &expected.q, tolerance);
    common::assert_close(&actual.prev_rho, &expected.prev_rho, tolerance);
    common::assert_close(&actual.rho, &expected.rho, tolerance);
    common::assert_close(&actual.beta, &expected.beta, tolerance);
}

fn run_initialize<V: ValueType>(device: &GpuDevice, host: &mut Blocks<V>, dev: &mut GpuBlocks<V>) {
    reference::initialize(
        &ReferenceDevice,
        &host.b,
        &mut host.r,
        &mut host.z,
        &mut host.p,
        &mut host.q,
        &mut host.prev_rho,
        &mut host.rho,
    )
    .unwrap();
    gpu::initialize(
        device,
        &dev.b,
        &mut dev.r,
        &mut dev.z,
        &mut dev.p,
        &mut dev.q,
        &mut dev.prev_rho,
        &mut dev.rho,
    )
    .unwrap();
}

fn run_step_1<V: ValueType>(device: &GpuDevice, host: &mut Blocks<V>, dev: &mut GpuBlocks<V>) {
    reference::step_1(&ReferenceDevice, &mut host.p, &host.z, &host.rho, &host.prev_rho).unwrap();
    gpu::step_1(device, &mut dev.p, &dev.z, &dev.rho, &dev.prev_rho).unwrap();
}

fn run_step_2<V: ValueType>(device: &GpuDevice, host: &mut Blocks<V>, dev: &mut GpuBlocks<V>) {
    reference::step_2(
        &ReferenceDevice,
        &mut host.x,
        &mut host.r,
        &host.p,
        &host.q,
        &host.beta,
        &host.rho,
    )
    .unwrap();
    gpu::step_2(device, &mut dev.x, &mut dev.r, &dev.p, &dev.q, &dev.beta, &dev.rho).unwrap();
}

fn column<V: ValueType>(block: &Dense<V>, col: usize) -> Vec<V> {
    (0..block.rows()).map(|row| block.at(row, col)).collect()
}

#[test]
fn initialize_is_equivalent() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(1);
    let mut host = Blocks::<f64>::random(&mut rng);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_initialize(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &host, TOLERANCE);
    assert_eq!(host.r, host.b);
    assert!(host.prev_rho.values().iter().all(|v| *v == 1.0));
}

#[test]
fn initialize_is_idempotent() {
    let mut rng = fastrand::Rng::with_seed(2);
    let mut host = Blocks::<f64>::random(&mut rng);
    let fresh = host.clone();
    let reset = |blocks: &mut Blocks<f64>| {
        ReferenceDevice
            .initialize(
                &blocks.b,
                &mut blocks.r,
                &mut blocks.z,
                &mut blocks.p,
                &mut blocks.q,
                &mut blocks.prev_rho,
                &mut blocks.rho,
            )
            .unwrap();
    };
    reset(&mut host);
    let once_host = host.clone();
    reset(&mut host);
    assert_all_close(&host, &once_host, 0.0);

    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut host = fresh;
    let mut dev = GpuBlocks::mirror(&device, &host);
    run_initialize(&device, &mut host, &mut dev);
    let once_dev = dev.download();
    run_initialize(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &once_dev, 0.0);
    assert_all_close(&dev.download(), &host, TOLERANCE);
}

#[test]
fn step_1_is_equivalent() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(3);
    let mut host = Blocks::<f64>::random(&mut rng);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_1(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &host, TOLERANCE);
}

#[test]
fn step_1_keeps_columns_with_zero_prev_rho() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(4);
    let mut host = Blocks::<f64>::random(&mut rng);
    *host.prev_rho.at_mut(3, 0) = 0.0;
    let original = host.p.clone();
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_1(&device, &mut host, &mut dev);

    let from_gpu = dev.download();
    assert_eq!(column(&host.p, 3), column(&original, 3));
    assert_eq!(column(&from_gpu.p, 3), column(&original, 3));
    assert_ne!(column(&host.p, 2), column(&original, 2));
    assert_all_close(&from_gpu, &host, TOLERANCE);
}

#[test]
fn step_2_is_equivalent() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(5);
    let mut host = Blocks::<f64>::random(&mut rng);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_2(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &host, TOLERANCE);
}

#[test]
fn step_2_keeps_columns_with_zero_beta() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(6);
    let mut host = Blocks::<f64>::random(&mut rng);
    *host.beta.at_mut(0, 0) = 0.0;
    *host.beta.at_mut(6, 0) = 0.0;
    let original = host.clone();
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_2(&device, &mut host, &mut dev);

    let from_gpu = dev.download();
    for col in [0, 6] {
        assert_eq!(column(&host.x, col), column(&original.x, col));
        assert_eq!(column(&host.r, col), column(&original.r, col));
        assert_eq!(column(&from_gpu.x, col), column(&original.x, col));
        assert_eq!(column(&from_gpu.r, col), column(&original.r, col));
    }
    assert_all_close(&from_gpu, &host, TOLERANCE);
}

#[test]
fn complex_stages_are_equivalent() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(7);
    let mut host = Blocks::<Complex64>::random(&mut rng);
    *host.prev_rho.at_mut(1, 0) = Complex64::new(0.0, 0.0);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_1(&device, &mut host, &mut dev);
    run_step_2(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &host, TOLERANCE);
}

#[test]
fn single_precision_stages_are_equivalent() {
    let Some(device) = common::gpu_device() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(8);
    let mut host = Blocks::<f32>::random(&mut rng);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_step_1(&device, &mut host, &mut dev);
    run_step_2(&device, &mut host, &mut dev);
    run_initialize(&device, &mut host, &mut dev);

    assert_all_close(&dev.download(), &host, 1e-5);
}

#[test]
fn stages_in_sequence_stay_equivalent() {
    let Some(device) = common::gpu_device_f64() else {
        return;
    };
    let mut rng = fastrand::Rng::with_seed(9);
    let mut host = Blocks::<f64>::random(&mut rng);
    let mut dev = GpuBlocks::mirror(&device, &host);

    run_initialize(&device, &mut host, &mut dev);
    assert_all_close(&dev.download(), &host, TOLERANCE);

    // Fresh inputs for step_1, mirrored on both sides.
    let fresh = Blocks::<f64>::random(&mut rng);
    host.p = fresh.p;
    host.z = fresh.z;
    host.rho = fresh.rho;
    host.prev_rho = fresh.prev_rho;
    let mut dev = GpuBlocks::mirror(&device, &host);
    run_step_1(&device, &mut host, &mut dev);
    assert_all_close(&dev.download(), &host, TOLERANCE);

    // Fresh inputs for step_2.
    let fresh = Blocks::<f64>::random(&mut rng);
    host.x = fresh.x;
    host.r = fresh.r;
    host.p = fresh.p;
    host.q = fresh.q;
    host.beta = fresh.beta;
    host.rho = fresh.rho;
    let mut dev = GpuBlocks::mirror(&device, &host);
    run_step_2(&device, &mut host, &mut dev);
    assert_all_close(&dev.download(), &host, TOLERANCE);
}

#[test]
fn stages_reject_mismatched_blocks_on_both_backends() {
    let mut p = Dense::<f64>::zeros(ROWS, COLS);
    let z = Dense::zeros(ROWS, COLS);
    let rho = Dense::zeros(COLS, 1);
    let short = Dense::zeros(COLS - 1, 1);
    let err = ReferenceDevice.step_1(&mut p, &z, &rho, &short).unwrap_err();
    assert!(matches!(err, CgCoreError::InvalidDimensions(_)));

    let Some(device) = common::gpu_device() else {
        return;
    };
    let mut p = device.create_dense::<f32>(ROWS, COLS);
    let z = device.create_dense::<f32>(ROWS, COLS);
    let rho = device.create_dense::<f32>(COLS, 1);
    let short = device.create_dense::<f32>(COLS - 1, 1);
    let err = device.step_1(&mut p, &z, &rho, &short).unwrap_err();
    assert!(matches!(err, CgCoreError::InvalidDimensions(_)));
}
