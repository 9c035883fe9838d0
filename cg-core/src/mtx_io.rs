//! Matrix Market reading and writing.
//!
//! Reading understands every `matrix` header combination (coordinate or array
//! layout, real/integer/complex/pattern entries, general/symmetric/
//! skew-symmetric/hermitian storage). Writing always produces `general`
//! storage.

use crate::error::CgCoreError;
use crate::matrix_data::{MatrixData, Triplet};
use crate::value::{IndexType, ValueType};
use std::io::{BufRead, Write};
use std::str::SplitWhitespace;

/// Storage layout of a Matrix Market file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Sparse: one `row col value` line per stored entry.
    #[default]
    Coordinate,
    /// Dense, column-major, without coordinates.
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Real,
    Complex,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
    SkewSymmetric,
    Hermitian,
}

impl Symmetry {
    /// First stored row of column `col` in array layout.
    fn row_start(self, col: usize) -> usize {
        match self {
            Symmetry::General => 0,
            Symmetry::Symmetric | Symmetry::Hermitian => col,
            Symmetry::SkewSymmetric => col + 1,
        }
    }

    fn insert<V: ValueType, I: IndexType>(
        self,
        row: usize,
        col: usize,
        value: V,
        nonzeros: &mut Vec<Triplet<V, I>>,
    ) -> Result<(), CgCoreError> {
        nonzeros.push(Triplet::from_usize(row, col, value)?);
        let mirrored = match self {
            Symmetry::General => None,
            Symmetry::Symmetric if row != col => Some(value),
            Symmetry::Hermitian if row != col => Some(value.conj()),
            Symmetry::SkewSymmetric => Some(-value),
            _ => None,
        };
        if let Some(mirrored) = mirrored {
            nonzeros.push(Triplet::from_usize(col, row, mirrored)?);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    layout: Layout,
    field: Field,
    symmetry: Symmetry,
}

fn mm_error(message: impl Into<String>) -> CgCoreError {
    CgCoreError::MatrixMarket(message.into())
}

fn parse_description(line: &str) -> Result<Header, CgCoreError> {
    let lowered = line.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let [banner, object, layout, field, symmetry] = words.as_slice() else {
        return Err(mm_error(format!("Malformed header line: '{}'", line.trim())));
    };
    if *banner != "%%matrixmarket" || *object != "matrix" {
        return Err(mm_error(format!("Malformed header line: '{}'", line.trim())));
    }

    let layout = match *layout {
        "coordinate" => Layout::Coordinate,
        "array" => Layout::Array,
        other => return Err(mm_error(format!("Unknown storage layout '{}'", other))),
    };
    let field = match *field {
        "real" | "integer" => Field::Real,
        "complex" => Field::Complex,
        "pattern" => Field::Pattern,
        other => return Err(mm_error(format!("Unknown entry format '{}'", other))),
    };
    let symmetry = match *symmetry {
        "general" => Symmetry::General,
        "symmetric" => Symmetry::Symmetric,
        "skew-symmetric" => Symmetry::SkewSymmetric,
        "hermitian" => Symmetry::Hermitian,
        other => return Err(mm_error(format!("Unknown storage modifier '{}'", other))),
    };
    Ok(Header {
        layout,
        field,
        symmetry,
    })
}

/// Reads lines until `accept` returns true for one; fails on end of input.
fn next_line<R: BufRead>(
    reader: &mut R,
    what: &str,
    accept: impl Fn(&str) -> bool,
) -> Result<String, CgCoreError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(mm_error(format!("Unexpected end of input when reading the {}", what)));
        }
        if accept(&line) {
            return Ok(line);
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    tokens: &mut SplitWhitespace<'_>,
    what: impl Fn() -> String,
) -> Result<T, CgCoreError> {
    let token = tokens
        .next()
        .ok_or_else(|| mm_error(format!("Missing value when reading {}", what())))?;
    token
        .parse()
        .map_err(|_| mm_error(format!("Cannot parse '{}' when reading {}", token, what())))
}

fn read_entry<V: ValueType>(
    field: Field,
    tokens: &mut SplitWhitespace<'_>,
    what: impl Fn() -> String,
) -> Result<V, CgCoreError> {
    match field {
        Field::Pattern => Ok(V::one()),
        Field::Real => Ok(V::from_parts(parse_number(tokens, &what)?, 0.0)),
        Field::Complex => {
            let re = parse_number(tokens, &what)?;
            let im = parse_number(tokens, &what)?;
            Ok(V::from_parts(re, im))
        }
    }
}

/// Reads a matrix in Matrix Market format.
///
/// The returned entries are sorted in row-major order. Storage modifiers are
/// expanded, so the result always describes the full matrix.
pub fn read_raw<V: ValueType, I: IndexType, R: BufRead>(
    mut reader: R,
) -> Result<MatrixData<V, I>, CgCoreError> {
    let description = next_line(&mut reader, "header line", |line| !line.trim().is_empty())?;
    let header = parse_description(&description)?;
    if header.field == Field::Complex && !V::KIND.is_complex() {
        return Err(mm_error(format!(
            "trying to read a complex matrix into a real storage type ({})",
            V::NAME
        )));
    }

    let dimensions = next_line(&mut reader, "dimensions line", |line| {
        let trimmed = line.trim_start();
        !trimmed.is_empty() && !trimmed.starts_with('%')
    })?;

    let mut body = String::new();
    reader.read_to_string(&mut body)?;
    let mut tokens = body.split_whitespace();
    let mut dims = dimensions.split_whitespace();
    let size_error = || "matrix size, expected: rows cols [nnz]".to_string();
    let rows: usize = parse_number(&mut dims, size_error)?;
    let cols: usize = parse_number(&mut dims, size_error)?;

    let mut data = MatrixData::new((rows, cols));
    match header.layout {
        Layout::Coordinate => {
            let stored: usize = parse_number(&mut dims, size_error)?;
            data.nonzeros.reserve(stored);
            for i in 0..stored {
                let what = || format!("matrix entry {}", i);
                let row: usize = parse_number(&mut tokens, what)?;
                let col: usize = parse_number(&mut tokens, what)?;
                if row == 0 || col == 0 || row > rows || col > cols {
                    return Err(mm_error(format!(
                        "Entry {} at ({}, {}) lies outside the {}x{} matrix",
                        i, row, col, rows, cols
                    )));
                }
                let value = read_entry::<V>(header.field, &mut tokens, what)?;
                header
                    .symmetry
                    .insert(row - 1, col - 1, value, &mut data.nonzeros)?;
            }
        }
        Layout::Array => {
            data.nonzeros.reserve(rows.saturating_mul(cols));
            for col in 0..cols {
                for row in header.symmetry.row_start(col)..rows {
                    let what = || format!("matrix entry {}, {}", row, col);
                    let value = read_entry::<V>(header.field, &mut tokens, what)?;
                    header.symmetry.insert(row, col, value, &mut data.nonzeros)?;
                }
            }
        }
    }

    log::debug!(
        "Read {}x{} Matrix Market matrix ({:?}, {:?}) with {} entries",
        rows,
        cols,
        header.layout,
        header.symmetry,
        data.nonzeros.len()
    );
    data.ensure_row_major_order();
    Ok(data)
}

fn write_entry<V: ValueType, W: Write>(writer: &mut W, value: V) -> std::io::Result<()> {
    // Single precision values are printed at their own precision.
    let component = |part: f64| {
        if V::KIND.is_double() {
            part.to_string()
        } else {
            (part as f32).to_string()
        }
    };
    if V::KIND.is_complex() {
        write!(
            writer,
            "{} {}",
            component(value.real_part()),
            component(value.imag_part())
        )
    } else {
        write!(writer, "{}", component(value.real_part()))
    }
}

/// Writes `data` in Matrix Market format with `general` storage.
///
/// Coordinate layout writes the entries as stored, with 1-based indices.
/// Array layout writes every element column by column, filling in zeros.
pub fn write_raw<V: ValueType, I: IndexType, W: Write>(
    mut writer: W,
    data: &MatrixData<V, I>,
    layout: Layout,
) -> Result<(), CgCoreError> {
    let layout_name = match layout {
        Layout::Coordinate => "coordinate",
        Layout::Array => "array",
    };
    let field_name = if V::KIND.is_complex() { "complex" } else { "real" };
    writeln!(writer, "%%MatrixMarket matrix {} {} general", layout_name, field_name)?;

    let (rows, cols) = data.size;
    match layout {
        Layout::Coordinate => {
            writeln!(writer, "{} {} {}", rows, cols, data.nonzeros.len())?;
            for entry in &data.nonzeros {
                let (row, col) = entry.position()?;
                write!(writer, "{} {} ", row + 1, col + 1)?;
                write_entry(&mut writer, entry.value)?;
                writeln!(writer)?;
            }
        }
        Layout::Array => {
            let mut positioned = data
                .nonzeros
                .iter()
                .map(|entry| entry.position().map(|(row, col)| (col, row, entry.value)))
                .collect::<Result<Vec<_>, _>>()?;
            positioned.sort_by_key(|&(col, row, _)| (col, row));

            writeln!(writer, "{} {}", rows, cols)?;
            let mut next = positioned.iter().peekable();
            for col in 0..cols {
                for row in 0..rows {
                    let value = match next.peek() {
                        Some(&&(c, r, value)) if (c, r) == (col, row) => {
                            next.next();
                            value
                        }
                        _ => V::zero(),
                    };
                    write_entry(&mut writer, value)?;
                    writeln!(writer)?;
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}
