//! Statistical scores comparing model predictions with ground truth

mod correlation;
mod imputation;

pub use correlation::{correlation_scores, standardize_protein_name, CorrelationScore};
pub use imputation::{imputation_mean_score, imputation_score, imputation_std_score};
