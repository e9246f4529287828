//! Delimited text reading and writing for expression tables

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::data::ExpressionTable;
use crate::error::{MetricError, Result};

/// Identifiers and values of a labelled matrix as laid out on disk
struct LabeledMatrix {
    row_ids: Vec<String>,
    col_ids: Vec<String>,
    values: Array2<f64>,
}

/// Tab if the header contains one, comma otherwise
fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    if header.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

fn read_labeled_matrix(path: &Path) -> Result<LabeledMatrix> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(MetricError::EmptyData {
            reason: format!("Empty file: {}", path.display()),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(&content))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(MetricError::InvalidTable {
            reason: "Not enough columns in header".to_string(),
        });
    }
    let col_ids: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut row_ids = Vec::new();
    let mut data = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        row_ids.push(record.get(0).unwrap_or_default().to_string());
        for field in record.iter().skip(1) {
            let value = field.parse::<f64>().map_err(|_| MetricError::InvalidTable {
                reason: format!("Invalid expression value: '{}'", field),
            })?;
            data.push(value);
        }
    }

    if row_ids.is_empty() {
        return Err(MetricError::EmptyData {
            reason: format!("No data rows in {}", path.display()),
        });
    }

    let values = Array2::from_shape_vec((row_ids.len(), col_ids.len()), data).map_err(|e| {
        MetricError::InvalidTable {
            reason: format!("Ragged rows: {}", e),
        }
    })?;

    Ok(LabeledMatrix {
        row_ids,
        col_ids,
        values,
    })
}

/// Read a table with one cell per row.
/// Expected format: first column is cell IDs, first row is feature IDs.
pub fn read_expression_table<P: AsRef<Path>>(path: P) -> Result<ExpressionTable> {
    let path = path.as_ref();
    let m = read_labeled_matrix(path)?;
    log::debug!(
        "Read {} cells x {} features from {}",
        m.row_ids.len(),
        m.col_ids.len(),
        path.display()
    );
    ExpressionTable::new(m.values, m.row_ids, m.col_ids)
}

/// Read a table with one feature per row (count-matrix layout) and
/// transpose it to cells x features.
pub fn read_expression_table_transposed<P: AsRef<Path>>(path: P) -> Result<ExpressionTable> {
    let m = read_labeled_matrix(path.as_ref())?;
    ExpressionTable::new(m.values.reversed_axes().as_standard_layout().to_owned(), m.col_ids, m.row_ids)
}

/// Write a table as TSV, cells as rows
pub fn write_expression_table<P: AsRef<Path>>(path: P, table: &ExpressionTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;

    let mut header = vec!["cell_id".to_string()];
    header.extend(table.feature_ids().iter().cloned());
    writer.write_record(&header)?;

    for (i, cell_id) in table.cell_ids().iter().enumerate() {
        let mut row = vec![cell_id.clone()];
        row.extend(table.cell(i).iter().map(|v| format!("{}", v)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
