//! Correlation between imputed gene expression and measured protein levels
//!
//! Proteins are matched to genes by name. Antibody panel names usually carry
//! assay suffixes (`CD4_TotalSeqB`, `CD8a-ADT`) which are stripped before
//! matching; matching is case-insensitive.

use std::collections::HashMap;

use ndarray::ArrayView2;
use serde::Serialize;

use crate::error::{MetricError, Result};
use crate::stats::{pearson, spearman};

const ASSAY_SUFFIXES: [&str; 6] = ["_totalseqa", "_totalseqb", "_totalseqc", "_adt", "-adt", "_prot"];

/// Canonical upper-case marker name used to pair proteins with genes
pub fn standardize_protein_name(name: &str) -> String {
    let mut lower = name.trim().to_lowercase();
    for suffix in ASSAY_SUFFIXES {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            lower = stripped.to_string();
            break;
        }
    }
    lower.to_uppercase()
}

/// Correlation of one protein with its matching gene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationScore {
    pub protein: String,
    pub gene: String,
    pub spearman: f64,
    pub pearson: f64,
}

/// Spearman and Pearson correlation for every protein with a matching gene.
///
/// `expression` is cells x genes, `protein` is cells x proteins with the same
/// cells in the same order. Pairs with an undefined coefficient (a constant
/// column) are skipped. Fails with `EmptyData` when nothing can be scored.
pub fn correlation_scores(
    expression: ArrayView2<'_, f64>,
    protein: ArrayView2<'_, f64>,
    gene_names: &[String],
    protein_names: &[String],
) -> Result<Vec<CorrelationScore>> {
    if expression.nrows() != protein.nrows() {
        return Err(MetricError::DimensionMismatch {
            expected: format!("{} protein rows", expression.nrows()),
            got: format!("{}", protein.nrows()),
        });
    }
    if gene_names.len() != expression.ncols() || protein_names.len() != protein.ncols() {
        return Err(MetricError::DimensionMismatch {
            expected: format!("{} gene and {} protein names", expression.ncols(), protein.ncols()),
            got: format!("{} and {}", gene_names.len(), protein_names.len()),
        });
    }

    let mut gene_lookup: HashMap<String, usize> = HashMap::with_capacity(gene_names.len());
    for (j, gene) in gene_names.iter().enumerate() {
        gene_lookup.entry(gene.trim().to_uppercase()).or_insert(j);
    }

    let mut scores = Vec::new();
    for (k, protein_name) in protein_names.iter().enumerate() {
        let Some(&j) = gene_lookup.get(&standardize_protein_name(protein_name)) else {
            log::debug!("Protein '{}' has no matching gene", protein_name);
            continue;
        };

        let x = expression.column(j).to_vec();
        let y = protein.column(k).to_vec();
        let s = spearman(&x, &y);
        let p = pearson(&x, &y);
        if s.is_nan() || p.is_nan() {
            log::warn!(
                "Correlation between '{}' and '{}' is undefined (constant values); skipped",
                gene_names[j],
                protein_name
            );
            continue;
        }

        scores.push(CorrelationScore {
            protein: protein_name.clone(),
            gene: gene_names[j].clone(),
            spearman: s,
            pearson: p,
        });
    }

    if scores.is_empty() {
        return Err(MetricError::EmptyData {
            reason: "no protein could be paired with a gene for correlation".to_string(),
        });
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standardize_protein_name() {
        assert_eq!(standardize_protein_name("CD4_TotalSeqB"), "CD4");
        assert_eq!(standardize_protein_name(" cd8a-ADT "), "CD8A");
        assert_eq!(standardize_protein_name("CD19"), "CD19");
    }

    #[test]
    fn test_scores_matched_pairs_only() {
        let expression = array![[1.0, 5.0, 0.0], [2.0, 3.0, 1.0], [3.0, 1.0, 0.0], [4.0, 0.0, 2.0]];
        let protein = array![[10.0, 1.0], [20.0, 2.0], [30.0, 3.0], [40.0, 4.0]];
        let scores = correlation_scores(
            expression.view(),
            protein.view(),
            &names(&["CD4", "CD8A", "MS4A1"]),
            &names(&["CD4_TotalSeqB", "cd8a"]),
        )
        .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].gene, "CD4");
        assert!((scores[0].pearson - 1.0).abs() < 1e-12);
        assert!((scores[1].spearman + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_skipped() {
        let expression = array![[1.0, 2.0], [1.0, 3.0], [1.0, 4.0]];
        let protein = array![[1.0, 1.0], [2.0, 2.0], [3.0, 4.0]];
        let scores = correlation_scores(
            expression.view(),
            protein.view(),
            &names(&["CD3", "CD4"]),
            &names(&["CD3", "CD4"]),
        )
        .unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].protein, "CD4");
    }

    #[test]
    fn test_no_match_is_empty_data() {
        let expression = array![[1.0], [2.0]];
        let protein = array![[1.0], [2.0]];
        let result = correlation_scores(expression.view(), protein.view(), &names(&["GAPDH"]), &names(&["CD4"]));
        assert!(matches!(result, Err(MetricError::EmptyData { .. })));
    }
}
