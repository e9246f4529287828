//! Named dataset registry
//!
//! Maps a short dataset keyword to a loader function. The registry is built
//! explicitly once and passed around; nothing is registered implicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::ExpressionTable;
use crate::error::{MetricError, Result};
use crate::io::read_expression_table;

/// Gene expression plus optional protein panel for the same cells
#[derive(Debug, Clone)]
pub struct Dataset {
    pub genes: ExpressionTable,
    pub proteins: Option<ExpressionTable>,
}

impl Dataset {
    pub fn new(genes: ExpressionTable, proteins: Option<ExpressionTable>) -> Result<Self> {
        if let Some(proteins) = &proteins {
            genes.assert_matching_cells(proteins)?;
        }
        Ok(Self { genes, proteins })
    }
}

/// Loader entry: a plain function reading a dataset from a directory
#[derive(Clone, Copy)]
pub struct DatasetLoader {
    pub description: &'static str,
    pub load: fn(&Path) -> Result<Dataset>,
}

impl fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registry of dataset loaders keyed by lower-case keyword
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    loaders: BTreeMap<String, DatasetLoader>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn load_citeseq(dir: &Path) -> Result<Dataset> {
    let genes = read_expression_table(dir.join("genes.csv"))?;
    let proteins = read_expression_table(dir.join("proteins.csv"))?;
    Dataset::new(genes, Some(proteins))
}

fn load_rna_only(dir: &Path) -> Result<Dataset> {
    let genes = read_expression_table(dir.join("genes.csv"))?;
    Dataset::new(genes, None)
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the on-disk layouts understood out of the box
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let entries = [
            (
                "citeseq",
                DatasetLoader {
                    description: "genes.csv and proteins.csv measured on the same cells",
                    load: load_citeseq,
                },
            ),
            (
                "rnaonly",
                DatasetLoader {
                    description: "genes.csv only",
                    load: load_rna_only,
                },
            ),
        ];
        for (name, loader) in entries {
            // builtin names are valid and distinct
            registry.loaders.insert(name.to_string(), loader);
        }
        registry
    }

    /// Register a loader; names are alphanumeric keywords without underscores
    pub fn register(&mut self, name: &str, loader: DatasetLoader) -> Result<()> {
        let key = normalize_name(name);
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MetricError::InvalidInput {
                reason: format!("Invalid dataset name '{}': use ASCII letters and digits only", name),
            });
        }
        if self.loaders.contains_key(&key) {
            return Err(MetricError::InvalidInput {
                reason: format!("Dataset '{}' is already registered", key),
            });
        }
        self.loaders.insert(key, loader);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DatasetLoader> {
        let key = normalize_name(name);
        self.loaders.get(&key).ok_or_else(|| MetricError::LookupFailure {
            reason: format!(
                "Cannot find dataset with name '{}', available: {}",
                key,
                self.names().collect::<Vec<_>>().join(", ")
            ),
        })
    }

    pub fn load(&self, name: &str, dir: &Path) -> Result<Dataset> {
        let loader = self.get(name)?;
        log::info!("Loading dataset '{}' from {}", normalize_name(name), dir.display());
        (loader.load)(dir)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(|k| k.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &DatasetLoader)> {
        self.loaders.iter().map(|(k, v)| (k.as_str(), v))
    }
}
