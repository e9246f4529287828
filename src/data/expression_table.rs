//! Expression table: a cells x features matrix with identifier metadata

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;

use crate::error::{MetricError, Result};
use crate::rng::rng_from_seed;

/// Deduplicate feature names by appending _1, _2, etc. to repeats.
/// A suffix already taken by another name is skipped.
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = names.iter().cloned().collect();
    if used.len() == names.len() {
        return names;
    }
    let mut kept: HashSet<String> = HashSet::with_capacity(names.len());
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        if kept.insert(name.clone()) {
            result.push(name);
            continue;
        }
        let suffix = next_suffix.entry(name.clone()).or_insert(1);
        let mut new_name = format!("{}_{}", name, suffix);
        while used.contains(&new_name) {
            *suffix += 1;
            new_name = format!("{}_{}", name, suffix);
        }
        *suffix += 1;
        log::warn!("Duplicate feature name '{}' renamed to '{}'", name, new_name);
        used.insert(new_name.clone());
        kept.insert(new_name.clone());
        result.push(new_name);
    }
    result
}

/// Expression values for a set of cells.
/// Rows are cells, columns are features (genes or protein markers).
///
/// `indices` records, for every row, its position in the table this one was
/// subset from. A freshly built table has `indices == 0..n_cells`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    matrix: Array2<f64>,
    cell_ids: Vec<String>,
    feature_ids: Vec<String>,
    indices: Vec<usize>,
}

impl ExpressionTable {
    /// Create a new table from a matrix and its row/column identifiers
    pub fn new(matrix: Array2<f64>, cell_ids: Vec<String>, feature_ids: Vec<String>) -> Result<Self> {
        let indices = (0..matrix.nrows()).collect();
        Self::with_indices(matrix, cell_ids, feature_ids, indices)
    }

    fn with_indices(
        matrix: Array2<f64>,
        cell_ids: Vec<String>,
        feature_ids: Vec<String>,
        indices: Vec<usize>,
    ) -> Result<Self> {
        let (n_cells, n_features) = matrix.dim();

        if cell_ids.len() != n_cells {
            return Err(MetricError::DimensionMismatch {
                expected: format!("{} cell IDs", n_cells),
                got: format!("{} cell IDs", cell_ids.len()),
            });
        }
        if feature_ids.len() != n_features {
            return Err(MetricError::DimensionMismatch {
                expected: format!("{} feature IDs", n_features),
                got: format!("{} feature IDs", feature_ids.len()),
            });
        }
        if matrix.iter().any(|x| !x.is_finite()) {
            return Err(MetricError::InvalidTable {
                reason: "Expression values must be finite".to_string(),
            });
        }

        let mut unique = HashSet::with_capacity(n_cells);
        if let Some(dup) = cell_ids.iter().find(|id| !unique.insert(id.as_str())) {
            return Err(MetricError::InvalidTable {
                reason: format!("Duplicate cell identifier '{}'", dup),
            });
        }

        let feature_ids = deduplicate_names(feature_ids);

        Ok(Self {
            matrix,
            cell_ids,
            feature_ids,
            indices,
        })
    }

    /// Wrap a bare matrix, generating `cell{i}` / `feature{j}` identifiers
    pub fn from_matrix(matrix: Array2<f64>) -> Result<Self> {
        let (n_cells, n_features) = matrix.dim();
        let cell_ids = (0..n_cells).map(|i| format!("cell{}", i)).collect();
        let feature_ids = (0..n_features).map(|j| format!("feature{}", j)).collect();
        Self::new(matrix, cell_ids, feature_ids)
    }

    /// Replace the matrix while keeping identifiers and source indices
    pub(crate) fn with_matrix(&self, matrix: Array2<f64>) -> Result<Self> {
        if matrix.dim() != self.matrix.dim() {
            return Err(MetricError::DimensionMismatch {
                expected: format!("{:?}", self.matrix.dim()),
                got: format!("{:?}", matrix.dim()),
            });
        }
        Ok(Self {
            matrix,
            cell_ids: self.cell_ids.clone(),
            feature_ids: self.feature_ids.clone(),
            indices: self.indices.clone(),
        })
    }

    pub fn n_cells(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    /// Expression values as a view (cells x features)
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Row positions in the source table
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Expression profile of one cell
    pub fn cell(&self, cell_idx: usize) -> ArrayView1<'_, f64> {
        self.matrix.row(cell_idx)
    }

    /// Values of one feature across cells
    pub fn feature(&self, feature_idx: usize) -> ArrayView1<'_, f64> {
        self.matrix.column(feature_idx)
    }

    pub fn cell_index(&self, cell_id: &str) -> Option<usize> {
        self.cell_ids.iter().position(|id| id == cell_id)
    }

    pub fn feature_index(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|id| id == feature_id)
    }

    /// Total expression per cell
    pub fn library_sizes(&self) -> Vec<f64> {
        self.matrix.axis_iter(Axis(0)).map(|row| row.sum()).collect()
    }

    /// Subset to the rows at `positions`, in the given order
    pub fn select_rows(&self, positions: &[usize]) -> Result<Self> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.n_cells()) {
            return Err(MetricError::contract(format!(
                "row position {} out of range for table with {} cells",
                bad,
                self.n_cells()
            )));
        }

        let matrix = self.matrix.select(Axis(0), positions);
        let cell_ids = positions.iter().map(|&i| self.cell_ids[i].clone()).collect();
        let indices = positions.iter().map(|&i| self.indices[i]).collect();

        Self::with_indices(matrix, cell_ids, self.feature_ids.clone(), indices)
    }

    /// Subset to the named cells, in the given order
    pub fn subset_cells<S: AsRef<str>>(&self, cell_ids: &[S]) -> Result<Self> {
        let lookup: HashMap<&str, usize> = self
            .cell_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let positions = cell_ids
            .iter()
            .map(|id| {
                lookup
                    .get(id.as_ref())
                    .copied()
                    .ok_or_else(|| MetricError::LookupFailure {
                        reason: format!("cell '{}' not found", id.as_ref()),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        self.select_rows(&positions)
    }

    /// Subset to the named features, in the given order
    pub fn subset_features<S: AsRef<str>>(&self, feature_ids: &[S]) -> Result<Self> {
        let positions = feature_ids
            .iter()
            .map(|id| {
                self.feature_index(id.as_ref())
                    .ok_or_else(|| MetricError::LookupFailure {
                        reason: format!("feature '{}' not found", id.as_ref()),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        let matrix = self.matrix.select(Axis(1), &positions);
        let feature_ids = positions.iter().map(|&j| self.feature_ids[j].clone()).collect();
        Self::with_indices(matrix, self.cell_ids.clone(), feature_ids, self.indices.clone())
    }

    /// Shuffle cells reproducibly and split into (train, test)
    pub fn split(&self, train_ratio: f64, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&train_ratio) {
            return Err(MetricError::InvalidInput {
                reason: format!("train ratio must be in [0, 1], got {}", train_ratio),
            });
        }

        let mut order: Vec<usize> = (0..self.n_cells()).collect();
        order.shuffle(&mut rng_from_seed(Some(seed)));

        let n_train = (train_ratio * self.n_cells() as f64).floor() as usize;
        let (train, test) = order.split_at(n_train);
        Ok((self.select_rows(train)?, self.select_rows(test)?))
    }

    /// Fail unless both tables list the same cells in the same order
    pub fn assert_matching_cells(&self, other: &Self) -> Result<()> {
        if self.cell_ids != other.cell_ids {
            let first = self
                .cell_ids
                .iter()
                .zip(other.cell_ids.iter())
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| self.n_cells().min(other.n_cells()));
            return Err(MetricError::contract(format!(
                "cell identifiers are misaligned ({} vs {} cells, first difference at row {})",
                self.n_cells(),
                other.n_cells(),
                first
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_table_creation() {
        let table = ExpressionTable::new(
            array![[1.0, 0.0, 3.0], [0.0, 2.0, 5.0]],
            ids("c", 2),
            ids("g", 3),
        )
        .unwrap();
        assert_eq!(table.n_cells(), 2);
        assert_eq!(table.n_features(), 3);
        assert_eq!(table.indices(), &[0, 1]);
        assert_eq!(table.library_sizes(), vec![4.0, 7.0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = ExpressionTable::new(array![[1.0, 2.0]], ids("c", 2), ids("g", 2));
        assert!(matches!(result, Err(MetricError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_duplicate_cells_rejected() {
        let result = ExpressionTable::new(
            array![[1.0], [2.0]],
            vec!["c".to_string(), "c".to_string()],
            ids("g", 1),
        );
        assert!(matches!(result, Err(MetricError::InvalidTable { .. })));
    }

    #[test]
    fn test_duplicate_features_renamed() {
        let table = ExpressionTable::new(
            array![[1.0, 2.0, 3.0]],
            ids("c", 1),
            vec!["CD4".to_string(), "CD4".to_string(), "CD8".to_string()],
        )
        .unwrap();
        assert_eq!(table.feature_ids(), &["CD4", "CD4_1", "CD8"]);
    }

    #[test]
    fn test_renamed_features_avoid_existing_names() {
        let names = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let table = ExpressionTable::new(
            array![[1.0, 2.0, 3.0, 4.0]],
            ids("c", 1),
            names(&["A", "A", "A_1", "A"]),
        )
        .unwrap();
        assert_eq!(table.feature_ids(), &["A", "A_2", "A_1", "A_3"]);
        assert_eq!(table.feature_index("A_1"), Some(2));
    }

    #[test]
    fn test_select_rows_composes_indices() {
        let table = ExpressionTable::from_matrix(array![[0.0], [1.0], [2.0], [3.0]]).unwrap();
        let sub = table.select_rows(&[3, 1, 2]).unwrap();
        let subsub = sub.select_rows(&[2, 0]).unwrap();
        assert_eq!(subsub.indices(), &[2, 3]);
        assert_eq!(subsub.cell_ids(), &["cell2", "cell3"]);
        assert_eq!(subsub.matrix()[[1, 0]], 3.0);
        // source untouched
        assert_eq!(table.n_cells(), 4);
    }

    #[test]
    fn test_select_rows_out_of_range() {
        let table = ExpressionTable::from_matrix(array![[0.0], [1.0]]).unwrap();
        assert!(matches!(
            table.select_rows(&[5]),
            Err(MetricError::ContractViolation { .. })
        ));
    }

    #[test]
    fn test_subset_cells_by_id() {
        let table = ExpressionTable::from_matrix(array![[0.0], [1.0], [2.0]]).unwrap();
        let sub = table.subset_cells(&["cell2", "cell0"]).unwrap();
        assert_eq!(sub.matrix().column(0).to_vec(), vec![2.0, 0.0]);
        assert!(matches!(
            table.subset_cells(&["nope"]),
            Err(MetricError::LookupFailure { .. })
        ));
    }

    #[test]
    fn test_split_is_reproducible_and_disjoint() {
        let matrix = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let table = ExpressionTable::from_matrix(matrix).unwrap();
        let (train, test) = table.split(0.8, 42).unwrap();
        let (train2, _) = table.split(0.8, 42).unwrap();

        assert_eq!(train.n_cells(), 8);
        assert_eq!(test.n_cells(), 2);
        assert_eq!(train.cell_ids(), train2.cell_ids());
        assert!(test.cell_ids().iter().all(|id| !train.cell_ids().contains(id)));
    }

    #[test]
    fn test_assert_matching_cells() {
        let a = ExpressionTable::from_matrix(array![[0.0], [1.0]]).unwrap();
        let b = a.select_rows(&[1, 0]).unwrap();
        assert!(a.assert_matching_cells(&a.clone()).is_ok());
        assert!(matches!(
            a.assert_matching_cells(&b),
            Err(MetricError::ContractViolation { .. })
        ));
    }
}
