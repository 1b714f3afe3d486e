//! Rendering of batch results: paginated reports and the tabular result set.

use std::io::Write;

use serde::Serialize;

use crate::batch::ValidationResult;
use crate::error::ReportError;

/// Separator between warnings in the flat `warnings` column.
pub const WARNING_SEPARATOR: &str = " | ";

/// Consumes the ordered results and renders one section per dataset.
pub trait ReportSink {
    fn render(&mut self, results: &[ValidationResult]) -> Result<(), ReportError>;
}

// ---------------------------------------------------------------------------
// Plain text – one page per dataset, pages split by form feeds
// ---------------------------------------------------------------------------

pub struct TextReport<W: Write> {
    out: W,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        TextReport { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn render(&mut self, results: &[ValidationResult]) -> Result<(), ReportError> {
        let total = results.len();
        for (page, result) in results.iter().enumerate() {
            if page > 0 {
                write!(self.out, "\x0c")?;
            }
            writeln!(self.out, "{}", result.dataset)?;
            writeln!(self.out, "{}", "=".repeat(result.dataset.chars().count()))?;
            writeln!(self.out, "Status: {}", result.status)?;
            if !result.error.is_empty() {
                writeln!(self.out, "Error: {}", result.error)?;
            }
            for warning in &result.warnings {
                writeln!(self.out, "  * {warning}")?;
            }
            writeln!(self.out)?;
            writeln!(self.out, "Page {} of {total}", page + 1)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Markdown – one section per dataset, split by horizontal rules
// ---------------------------------------------------------------------------

pub struct MarkdownReport<W: Write> {
    out: W,
}

impl<W: Write> MarkdownReport<W> {
    pub fn new(out: W) -> Self {
        MarkdownReport { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for MarkdownReport<W> {
    fn render(&mut self, results: &[ValidationResult]) -> Result<(), ReportError> {
        writeln!(self.out, "# Data quality report")?;
        for result in results {
            writeln!(self.out)?;
            writeln!(self.out, "---")?;
            writeln!(self.out)?;
            writeln!(self.out, "## {}", result.dataset)?;
            writeln!(self.out)?;
            writeln!(self.out, "**Status:** {}", result.status)?;
            if !result.error.is_empty() {
                writeln!(self.out)?;
                writeln!(self.out, "**Error:** {}", result.error)?;
            }
            if !result.warnings.is_empty() {
                writeln!(self.out)?;
                for warning in &result.warnings {
                    writeln!(self.out, "- {warning}")?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tabular result set
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Row<'a> {
    dataset: &'a str,
    status: String,
    error: &'a str,
    warnings: String,
}

/// Write `dataset,status,error,warnings` rows.
pub fn write_csv<W: Write>(results: &[ValidationResult], out: W) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_writer(out);
    for r in results {
        writer.serialize(Row {
            dataset: &r.dataset,
            status: r.status.to_string(),
            error: &r.error,
            warnings: r.warnings.join(WARNING_SEPARATOR),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the results as a pretty JSON array.
pub fn write_json<W: Write>(results: &[ValidationResult], mut out: W) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut out, results)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Status, ValidationResult};

    fn results() -> Vec<ValidationResult> {
        vec![
            ValidationResult {
                dataset: "gdp".into(),
                status: Status::Ok,
                error: String::new(),
                warnings: vec!["[gdp] gaps in index 'year' (expected step 1): missing 2002".into()],
            },
            ValidationResult::failed("co2", "[co2] missing-columns: value"),
        ]
    }

    #[test]
    fn text_report_has_one_page_per_dataset() {
        let mut sink = TextReport::new(Vec::new());
        sink.render(&results()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let pages: Vec<&str> = text.split('\x0c').collect();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].starts_with("gdp\n===\nStatus: OK\n"));
        assert!(pages[0].contains("  * [gdp] gaps"));
        assert!(!pages[0].contains("Error:"));
        assert!(pages[1].contains("Status: ERROR\nError: [co2] missing-columns: value"));
        assert!(pages[1].contains("Page 2 of 2"));
    }

    #[test]
    fn markdown_report_sections() {
        let mut sink = MarkdownReport::new(Vec::new());
        sink.render(&results()).unwrap();
        let md = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(md.matches("\n## ").count(), 2);
        assert!(md.contains("- [gdp] gaps"));
        assert!(md.contains("**Error:** [co2] missing-columns: value"));
    }

    #[test]
    fn csv_has_the_four_columns() {
        let mut buf = Vec::new();
        write_csv(&results(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("dataset,status,error,warnings"));
        assert_eq!(
            lines.next(),
            Some("gdp,OK,,[gdp] gaps in index 'year' (expected step 1): missing 2002")
        );
        assert_eq!(lines.next(), Some("co2,ERROR,[co2] missing-columns: value,"));
    }

    #[test]
    fn json_round_trips_field_names() {
        let mut buf = Vec::new();
        write_json(&results(), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[1]["status"], "ERROR");
        assert_eq!(value[0]["warnings"].as_array().unwrap().len(), 1);
    }
}
