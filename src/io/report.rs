//! Metric report output

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{MetricError, Result};
use crate::metrics::MetricReport;

/// On-disk format of a metric report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Tsv,
}

impl FromStr for ReportFormat {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "tsv" => Ok(ReportFormat::Tsv),
            other => Err(MetricError::InvalidInput {
                reason: format!("Unknown report format '{}'. Use 'json' or 'tsv'.", other),
            }),
        }
    }
}

impl ReportFormat {
    /// Guess the format from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") | Some("txt") => ReportFormat::Tsv,
            _ => ReportFormat::Json,
        }
    }
}

/// Write a report to `writer`
pub fn render_report<W: Write>(writer: W, report: &MetricReport, format: ReportFormat) -> Result<()> {
    // JSON has no encoding for inf/NaN
    if let Some((name, value)) = report.iter().find(|(_, v)| !v.is_finite()) {
        return Err(MetricError::InvalidInput {
            reason: format!("report value '{}' is not finite ({})", name, value),
        });
    }
    match format {
        ReportFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
        }
        ReportFormat::Tsv => {
            let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
            writer.write_record(["metric", "value"])?;
            for (name, value) in report {
                writer.write_record([name.as_str(), &format!("{:.6}", value)])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Write a report to a file
pub fn write_report<P: AsRef<Path>>(path: P, report: &MetricReport, format: ReportFormat) -> Result<()> {
    let file = File::create(path)?;
    render_report(BufWriter::new(file), report, format)
}
