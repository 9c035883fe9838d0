use crate::bindings::{create_mat_descr, IndexBase, MatDescr, Operation};
use crate::context::GpuContext;
use crate::dense::Dense;
use crate::device::GpuDevice;
use crate::error::CgCoreError;
use crate::matrix_data::{MatrixData, Triplet};
use crate::traits::Matrix;
use crate::value::{IndexType, ValueType};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// Sparse matrix in Compressed Sparse Row (CSR) format on the CPU.
///
/// `row_ptrs` has `rows + 1` entries; `row_ptrs[i]..row_ptrs[i + 1]` is the
/// range of `values` / `col_idxs` holding row `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Csr<V: ValueType, I: IndexType> {
    rows: usize,
    cols: usize,
    values: Vec<V>,
    col_idxs: Vec<I>,
    row_ptrs: Vec<I>,
}

fn index<I: IndexType>(value: usize) -> Result<I, CgCoreError> {
    I::from_usize(value).ok_or_else(|| {
        CgCoreError::InvalidDimensions(format!("{} does not fit {} indices", value, I::WIDTH))
    })
}

impl<V: ValueType, I: IndexType> Csr<V, I> {
    /// Creates an empty matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: Vec::new(),
            col_idxs: Vec::new(),
            row_ptrs: vec![I::default(); rows + 1],
        }
    }

    /// Creates a matrix from CSR components, validating their structure.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        values: Vec<V>,
        col_idxs: Vec<I>,
        row_ptrs: Vec<I>,
    ) -> Result<Self, CgCoreError> {
        if row_ptrs.len() != rows + 1 {
            return Err(CgCoreError::InvalidDimensions(format!(
                "row_ptrs length must be rows + 1 ({}), got {}",
                rows + 1,
                row_ptrs.len()
            )));
        }
        if values.len() != col_idxs.len() {
            return Err(CgCoreError::InvalidDimensions(
                "values and col_idxs must have the same length".to_string(),
            ));
        }
        if row_ptrs[0].to_usize() != Some(0) {
            return Err(CgCoreError::InvalidDimensions(
                "First element of row_ptrs must be zero".to_string(),
            ));
        }
        if row_ptrs.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(CgCoreError::InvalidDimensions(
                "row_ptrs must be non-decreasing".to_string(),
            ));
        }
        if row_ptrs[rows].to_usize() != Some(values.len()) {
            return Err(CgCoreError::InvalidDimensions(
                "Last element of row_ptrs must equal the number of non-zero values".to_string(),
            ));
        }
        if col_idxs
            .iter()
            .any(|c| c.to_usize().map_or(true, |c| c >= cols))
        {
            return Err(CgCoreError::InvalidDimensions(
                "Column index out of bounds".to_string(),
            ));
        }

        Ok(Self {
            rows,
            cols,
            values,
            col_idxs,
            row_ptrs,
        })
    }

    /// Builds a matrix from coordinate entries, which may come in any order.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: Vec<Triplet<V, I>>,
    ) -> Result<Self, CgCoreError> {
        let mut data = MatrixData::with_nonzeros((rows, cols), triplets);
        data.ensure_row_major_order();

        let mut counts = vec![0usize; rows + 1];
        for entry in &data.nonzeros {
            let (row, col) = entry.position()?;
            if row >= rows {
                return Err(CgCoreError::InvalidDimensions(
                    "Row index out of bounds".to_string(),
                ));
            }
            if col >= cols {
                return Err(CgCoreError::InvalidDimensions(
                    "Column index out of bounds".to_string(),
                ));
            }
            counts[row + 1] += 1;
        }
        for i in 1..=rows {
            counts[i] += counts[i - 1];
        }

        let row_ptrs = counts
            .into_iter()
            .map(index::<I>)
            .collect::<Result<Vec<_>, _>>()?;
        let values = data.nonzeros.iter().map(|t| t.value).collect();
        let col_idxs = data.nonzeros.iter().map(|t| t.col).collect();
        Self::from_csr(rows, cols, values, col_idxs, row_ptrs)
    }

    /// Builds a matrix from interchange data, dropping explicit zeros.
    pub fn from_matrix_data(data: &MatrixData<V, I>) -> Result<Self, CgCoreError> {
        let nonzeros = data
            .nonzeros
            .iter()
            .filter(|entry| entry.value != V::zero())
            .copied()
            .collect();
        Self::from_triplets(data.size.0, data.size.1, nonzeros)
    }

    /// Stored entries in row-major order.
    pub fn to_matrix_data(&self) -> MatrixData<V, I> {
        let mut data = MatrixData::new((self.rows, self.cols));
        for row in 0..self.rows {
            let row_idx = self.row_index(row);
            for e in self.row_range(row) {
                data.nonzeros
                    .push(Triplet::new(row_idx, self.col_idxs[e], self.values[e]));
            }
        }
        data
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    pub fn col_idxs(&self) -> &[I] {
        &self.col_idxs
    }

    pub fn row_ptrs(&self) -> &[I] {
        &self.row_ptrs
    }

    // Validated on construction, so the conversions cannot fail.
    fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        let start = self.row_ptrs[row].to_usize().unwrap_or_default();
        let end = self.row_ptrs[row + 1].to_usize().unwrap_or_default();
        start..end
    }

    fn col_at(&self, entry: usize) -> usize {
        self.col_idxs[entry].to_usize().unwrap_or_default()
    }

    fn row_index(&self, row: usize) -> I {
        I::from_usize(row).unwrap_or_default()
    }

    /// Gets the value at a specific row and column.
    /// This is inefficient for sparse matrices, primarily for testing/debugging.
    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.row_range(row)
            .find(|&e| self.col_at(e) == col)
            .map(|e| self.values[e])
    }

    /// Reference SpMV: `y := alpha * op(A) * x + beta * y` for every column of `x`.
    ///
    /// `y` is not read when `beta` is zero. Each output element accumulates its
    /// products in ascending order of the stored entries.
    pub fn apply(
        &self,
        op: Operation,
        alpha: V,
        x: &Dense<V>,
        beta: V,
        y: &mut Dense<V>,
    ) -> Result<(), CgCoreError> {
        let (out_rows, in_rows) = match op {
            Operation::NonTranspose => (self.rows, self.cols),
            Operation::Transpose => (self.cols, self.rows),
        };
        let k = x.cols();
        if x.rows() != in_rows || y.rows() != out_rows || y.cols() != k {
            return Err(CgCoreError::InvalidDimensions(format!(
                "SpMV with {:?} of a {}x{} matrix: x is {}x{}, y is {}x{}",
                op,
                self.rows,
                self.cols,
                x.rows(),
                x.cols(),
                y.rows(),
                y.cols()
            )));
        }

        let xv = x.values();
        let mut acc = vec![V::zero(); out_rows * k];
        match op {
            Operation::NonTranspose => {
                for row in 0..self.rows {
                    for j in 0..k {
                        let mut sum = V::zero();
                        for e in self.row_range(row) {
                            sum = sum + self.values[e] * xv[self.col_at(e) * k + j];
                        }
                        acc[row * k + j] = sum;
                    }
                }
            }
            Operation::Transpose => {
                for row in 0..self.rows {
                    for e in self.row_range(row) {
                        let col = self.col_at(e);
                        for j in 0..k {
                            acc[col * k + j] = acc[col * k + j] + self.values[e] * xv[row * k + j];
                        }
                    }
                }
            }
        }

        let beta_is_zero = beta == V::zero();
        for (out, sum) in y.values_mut().iter_mut().zip(acc) {
            let mut value = alpha * sum;
            if !beta_is_zero {
                value = value + beta * *out;
            }
            *out = value;
        }
        Ok(())
    }

    /// Transpose (not conjugated). Within each row of the result, entries are
    /// ordered by ascending row of the original.
    pub fn transpose(&self) -> Result<Self, CgCoreError> {
        let mut counts = vec![0usize; self.cols + 1];
        for e in 0..self.nnz() {
            counts[self.col_at(e) + 1] += 1;
        }
        for i in 1..=self.cols {
            counts[i] += counts[i - 1];
        }

        let mut next = counts.clone();
        let mut values = vec![V::zero(); self.nnz()];
        let mut col_idxs = vec![I::default(); self.nnz()];
        for row in 0..self.rows {
            let row_idx = index::<I>(row)?;
            for e in self.row_range(row) {
                let col = self.col_at(e);
                let pos = next[col];
                values[pos] = self.values[e];
                col_idxs[pos] = row_idx;
                next[col] += 1;
            }
        }

        let row_ptrs = counts
            .into_iter()
            .map(index::<I>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_csr(self.cols, self.rows, values, col_idxs, row_ptrs)
    }
}

impl<V: ValueType, I: IndexType> Matrix for Csr<V, I> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

const SPARSE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

fn upload<T: bytemuck::Pod>(context: &GpuContext, label: &str, data: &[T]) -> wgpu::Buffer {
    if data.is_empty() {
        context.create_empty_buffer(label, std::mem::size_of::<T>() as u64, SPARSE_USAGE)
    } else {
        context.create_gpu_buffer_with_data(label, bytemuck::cast_slice(data), SPARSE_USAGE)
    }
}

fn allocate<T>(context: &GpuContext, label: &str, len: usize) -> wgpu::Buffer {
    let size = (len.max(1) * std::mem::size_of::<T>()) as u64;
    context.create_empty_buffer(label, size, SPARSE_USAGE)
}

/// Sparse matrix in CSR format stored on the GPU.
///
/// Owns a matrix descriptor, created on first use by [`CsrGpu::descriptor`].
#[derive(Debug)]
pub struct CsrGpu<V: ValueType, I: IndexType> {
    rows: usize,
    cols: usize,
    nnz: usize,
    values_buffer: wgpu::Buffer,
    col_idxs_buffer: wgpu::Buffer,
    row_ptrs_buffer: wgpu::Buffer,
    descr: OnceLock<MatDescr>,
    pub(crate) context: Arc<GpuContext>,
    _marker: PhantomData<(V, I)>,
}

impl<V: ValueType, I: IndexType> CsrGpu<V, I> {
    /// Uploads a host matrix to `device`.
    pub fn from_csr(device: &GpuDevice, source: &Csr<V, I>) -> Self {
        let context = device.context();
        Self {
            rows: source.rows(),
            cols: source.cols(),
            nnz: source.nnz(),
            values_buffer: upload(context, "csr values", source.values()),
            col_idxs_buffer: upload(context, "csr col_idxs", source.col_idxs()),
            row_ptrs_buffer: upload(context, "csr row_ptrs", source.row_ptrs()),
            descr: OnceLock::new(),
            context: Arc::clone(context),
            _marker: PhantomData,
        }
    }

    /// Uploads a host matrix with its indices shifted to `index_base`.
    ///
    /// The matrix descriptor is set to the same base, so library calls that
    /// take `descriptor()` read the indices correctly.
    pub fn from_csr_with_base(
        device: &GpuDevice,
        source: &Csr<V, I>,
        index_base: IndexBase,
    ) -> Result<Self, CgCoreError> {
        let offset = index_base.offset() as usize;
        let shift = |indices: &[I]| -> Result<Vec<I>, CgCoreError> {
            indices
                .iter()
                .map(|&idx| {
                    let idx = idx.to_usize().ok_or_else(|| {
                        CgCoreError::Internal(format!("Negative index {:?} in validated matrix", idx))
                    })?;
                    index(idx + offset)
                })
                .collect()
        };
        let context = device.context();
        let mut descr = create_mat_descr();
        descr.set_index_base(index_base);
        Ok(Self {
            rows: source.rows(),
            cols: source.cols(),
            nnz: source.nnz(),
            values_buffer: upload(context, "csr values", source.values()),
            col_idxs_buffer: upload(context, "csr col_idxs", &shift(source.col_idxs())?),
            row_ptrs_buffer: upload(context, "csr row_ptrs", &shift(source.row_ptrs())?),
            descr: OnceLock::from(descr),
            context: Arc::clone(context),
            _marker: PhantomData,
        })
    }

    /// Allocates a zero-filled matrix with room for `nnz` entries, e.g. as the
    /// output of a transpose.
    pub fn empty(device: &GpuDevice, rows: usize, cols: usize, nnz: usize) -> Self {
        let context = device.context();
        Self {
            rows,
            cols,
            nnz,
            values_buffer: allocate::<V>(context, "csr values", nnz),
            col_idxs_buffer: allocate::<I>(context, "csr col_idxs", nnz),
            row_ptrs_buffer: allocate::<I>(context, "csr row_ptrs", rows + 1),
            descr: OnceLock::new(),
            context: Arc::clone(context),
            _marker: PhantomData,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// The matrix descriptor, created with default settings on first use.
    pub fn descriptor(&self) -> &MatDescr {
        self.descr.get_or_init(create_mat_descr)
    }

    /// Replaces the matrix descriptor.
    pub fn set_descriptor(&mut self, descr: MatDescr) {
        self.descr = OnceLock::from(descr);
    }

    pub(crate) fn values_buffer(&self) -> &wgpu::Buffer {
        &self.values_buffer
    }

    pub(crate) fn col_idxs_buffer(&self) -> &wgpu::Buffer {
        &self.col_idxs_buffer
    }

    pub(crate) fn row_ptrs_buffer(&self) -> &wgpu::Buffer {
        &self.row_ptrs_buffer
    }

    pub async fn read_values(&self) -> Result<Vec<V>, CgCoreError> {
        self.context
            .read_buffer_to_cpu(&self.values_buffer, self.nnz)
            .await
    }

    pub async fn read_col_idxs(&self) -> Result<Vec<I>, CgCoreError> {
        self.context
            .read_buffer_to_cpu(&self.col_idxs_buffer, self.nnz)
            .await
    }

    pub async fn read_row_ptrs(&self) -> Result<Vec<I>, CgCoreError> {
        self.context
            .read_buffer_to_cpu(&self.row_ptrs_buffer, self.rows + 1)
            .await
    }

    /// Reads the matrix back into a host CSR matrix (zero-based indices).
    pub async fn to_host(&self) -> Result<Csr<V, I>, CgCoreError> {
        let values = self.read_values().await?;
        let col_idxs = self.read_col_idxs().await?;
        let row_ptrs = self.read_row_ptrs().await?;
        Csr::from_csr(self.rows, self.cols, values, col_idxs, row_ptrs)
    }
}

impl<V: ValueType, I: IndexType> Matrix for CsrGpu<V, I> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}
