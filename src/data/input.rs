//! Inputs accepted by metrics and models

use std::path::PathBuf;

use ndarray::Array2;

use super::ExpressionTable;
use crate::error::{MetricError, Result};
use crate::io::read_expression_table;

/// A single value or an ordered list of values.
///
/// Singletons are wrapped into one-element lists before use, so passing `One(x)`
/// behaves exactly like passing `Many(vec![x])`.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(x) => vec![x],
            OneOrMany::Many(xs) => xs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(x: T) -> Self {
        OneOrMany::One(x)
    }
}

/// Anything that can be coerced into an [`ExpressionTable`]
#[derive(Debug, Clone, PartialEq)]
pub enum TableInput {
    Table(ExpressionTable),
    /// Bare cells x features matrix; identifiers are generated
    Matrix(Array2<f64>),
    /// Delimited text file (`.csv`, `.tsv` or `.txt`)
    Path(PathBuf),
}

impl TableInput {
    pub fn into_table(self) -> Result<ExpressionTable> {
        match self {
            TableInput::Table(table) => Ok(table),
            TableInput::Matrix(matrix) => ExpressionTable::from_matrix(matrix),
            TableInput::Path(path) => {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase());
                match ext.as_deref() {
                    Some("csv") | Some("tsv") | Some("txt") => read_expression_table(&path),
                    _ => Err(MetricError::LookupFailure {
                        reason: format!(
                            "cannot coerce '{}' into an expression table (expected .csv, .tsv or .txt)",
                            path.display()
                        ),
                    }),
                }
            }
        }
    }
}

impl From<ExpressionTable> for TableInput {
    fn from(table: ExpressionTable) -> Self {
        TableInput::Table(table)
    }
}

impl From<Array2<f64>> for TableInput {
    fn from(matrix: Array2<f64>) -> Self {
        TableInput::Matrix(matrix)
    }
}

impl From<PathBuf> for TableInput {
    fn from(path: PathBuf) -> Self {
        TableInput::Path(path)
    }
}

impl From<ExpressionTable> for OneOrMany<TableInput> {
    fn from(table: ExpressionTable) -> Self {
        OneOrMany::One(TableInput::Table(table))
    }
}

impl From<Vec<ExpressionTable>> for OneOrMany<TableInput> {
    fn from(tables: Vec<ExpressionTable>) -> Self {
        OneOrMany::Many(tables.into_iter().map(TableInput::Table).collect())
    }
}

/// Auxiliary payload handed to a metric's scoring step
#[derive(Debug, Clone, PartialEq)]
pub enum Extras {
    Table(ExpressionTable),
    Matrix(Array2<f64>),
}

impl From<ExpressionTable> for Extras {
    fn from(table: ExpressionTable) -> Self {
        Extras::Table(table)
    }
}
