//! Expression data containers, corruption and dataset lookup

mod corruption;
mod expression_table;
mod input;
pub mod registry;

pub use corruption::{CorruptionDist, CorruptionParams, DEFAULT_RETAIN_RATE};
pub use expression_table::ExpressionTable;
pub use input::{Extras, OneOrMany, TableInput};
pub use registry::{Dataset, DatasetLoader, DatasetRegistry};
