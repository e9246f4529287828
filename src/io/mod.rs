//! Input/Output for expression tables and metric reports

mod csv;
mod report;

pub use self::csv::{read_expression_table, read_expression_table_transposed, write_expression_table};
pub use report::{render_report, write_report, ReportFormat};
