//! Report rendering and output files.
//!
//! Each record renders to two cells: the clinical significance of every
//! ClinVar entry found for it, and the disease conditions attached to those
//! entries. Values are bracketed and `|`-joined (`[Pathogenic]|[Benign]`);
//! commas become semicolons so the cells survive naive CSV splitting.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{StringRecord, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::loader::VariantTable;
use crate::models::{SearchState, VariantRecord};

pub const NOT_SEARCHED: &str = "not searched";
pub const NO_ITEMS_FOUND: &str = "no items found";
pub const MANUAL_REVIEW: &str = "manual review needed";

const SUMMARY_HEADER: [&str; 5] = [
    "Gene Name",
    "Clinical Significance",
    "Detailed Variant Annotation",
    "SNP (rs number)",
    "Disease Conditions",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

/// Which report to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// New CSV with gene, significance, annotation, SNP and conditions.
    #[default]
    Summary,
    /// Copy of the input with significance and conditions columns appended.
    Append,
}

fn bracket_join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|v| format!("[{v}]"))
        .collect::<Vec<_>>()
        .join("|")
        .replace(',', ";")
}

/// Clinical significance cell for one record.
pub fn significance_cell(record: &VariantRecord) -> String {
    match record.state() {
        SearchState::NotSearchable => NOT_SEARCHED.to_string(),
        SearchState::IdentifiersFound { identifiers } if identifiers.is_empty() => {
            NO_ITEMS_FOUND.to_string()
        }
        SearchState::SummariesFound { summaries, .. } => {
            let values: Option<Vec<&str>> = summaries
                .values()
                .map(|s| s.clinical_significance.as_deref())
                .collect();
            match values {
                Some(values) => bracket_join(values.into_iter()),
                None => MANUAL_REVIEW.to_string(),
            }
        }
        // Not reached before the run ended
        SearchState::Unsearched | SearchState::IdentifiersFound { .. } => String::new(),
    }
}

/// Disease conditions cell for one record. Empty unless every summary
/// carries at least one condition name.
pub fn conditions_cell(record: &VariantRecord) -> String {
    let Some(summaries) = record.summaries() else {
        return String::new();
    };
    let mut names = Vec::new();
    for summary in summaries.values() {
        match summary.conditions.as_deref() {
            Some(conditions) if !conditions.is_empty() => {
                names.extend(conditions.iter().map(String::as_str));
            }
            _ => return String::new(),
        }
    }
    bracket_join(names.into_iter())
}

/// `<stem>_ClinVarResultSummary_<YYYYMMDD>.csv` or
/// `<stem>_ClinVarAppended_<YYYYMMDD>.<ext>`, next to the input unless `dir` is given.
pub fn output_path(input: &Path, mode: OutputMode, date: NaiveDate, dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("variants");
    let stamp = date.format("%Y%m%d");
    let name = match mode {
        OutputMode::Summary => format!("{stem}_ClinVarResultSummary_{stamp}.csv"),
        OutputMode::Append => {
            let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("csv");
            format!("{stem}_ClinVarAppended_{stamp}.{ext}")
        }
    };
    let dir = dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}

/// Write the summary CSV.
pub fn write_summary<W: Write>(out: W, records: &[VariantRecord]) -> Result<(), ReportError> {
    let mut wtr = WriterBuilder::new().terminator(Terminator::CRLF).from_writer(out);
    wtr.write_record(SUMMARY_HEADER)?;
    for r in records {
        let significance = significance_cell(r);
        let conditions = conditions_cell(r);
        wtr.write_record([
            r.variant.gene.as_str(),
            significance.as_str(),
            r.variant.raw_annotation.as_str(),
            r.variant.snp.as_str(),
            conditions.as_str(),
        ])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write the input rows back out with two result columns appended.
pub fn write_appended<W: Write>(
    out: W,
    table: &VariantTable,
    records: &[VariantRecord],
) -> Result<(), ReportError> {
    let mut wtr = WriterBuilder::new()
        .delimiter(table.format.delimiter())
        .terminator(Terminator::CRLF)
        .flexible(true)
        .from_writer(out);

    let mut header = table.header.clone();
    header.push_field("Clinical Significance");
    header.push_field("Conditions");
    wtr.write_record(&header)?;

    let by_row: HashMap<usize, &VariantRecord> = records.iter().map(|r| (r.variant.row, r)).collect();

    for (i, row) in table.rows.iter().enumerate() {
        let mut out_row: StringRecord = row.clone();
        match by_row.get(&i) {
            Some(record) => {
                if !row.iter().any(|f| f.contains(record.variant.raw_annotation.as_str())) {
                    warn!(row = i + 1, "Source row does not contain the record's annotation");
                }
                out_row.push_field(&significance_cell(record));
                out_row.push_field(&conditions_cell(record));
            }
            None => {
                warn!(row = i + 1, "No variant record for source row");
                out_row.push_field("");
                out_row.push_field("");
            }
        }
        wtr.write_record(&out_row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write the report for `mode` to `path`.
pub fn write_report(
    path: &Path,
    mode: OutputMode,
    table: &VariantTable,
    records: &[VariantRecord],
) -> Result<(), ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match mode {
        OutputMode::Summary => write_summary(file, records)?,
        OutputMode::Append  => write_appended(file, table, records)?,
    }
    info!(path = %path.display(), ?mode, "Report written");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{read_variants, ColumnMap, InputFormat};
    use crate::models::{RecordSummary, SummaryMap, VariantInput};

    fn record(tokens: &[&str]) -> VariantRecord {
        VariantRecord::new(
            VariantInput {
                gene: "BRCA1".into(),
                raw_annotation: "NM_000059.3:c.A123G".into(),
                snp: "rs80357382".into(),
                ..Default::default()
            },
            tokens.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn summary(sig: Option<&str>, conds: Option<&[&str]>) -> RecordSummary {
        RecordSummary {
            clinical_significance: sig.map(String::from),
            conditions: conds.map(|c| c.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn summarised(entries: Vec<(&str, RecordSummary)>) -> VariantRecord {
        let mut r = record(&["NM_000059.3:c.123A>G"]);
        r.record_identifiers(entries.iter().map(|(id, _)| id.to_string()).collect());
        let mut map = SummaryMap::new();
        for (id, s) in entries {
            map.insert(id.to_string(), s);
        }
        r.record_summaries(map);
        r
    }

    #[test]
    fn test_not_searchable_cells() {
        let r = record(&[]);
        assert_eq!(significance_cell(&r), "not searched");
        assert_eq!(conditions_cell(&r), "");
    }

    #[test]
    fn test_no_items_found() {
        let mut r = record(&["x"]);
        r.record_identifiers(vec![]);
        assert_eq!(significance_cell(&r), "no items found");
        assert_eq!(conditions_cell(&r), "");
    }

    #[test]
    fn test_unresolved_cells_are_empty() {
        let mut r = record(&["x"]);
        assert_eq!(significance_cell(&r), "");
        r.record_identifiers(vec!["1".into()]);
        assert_eq!(significance_cell(&r), "");
        assert_eq!(conditions_cell(&r), "");
    }

    #[test]
    fn test_joined_significance_and_conditions() {
        let r = summarised(vec![
            ("111", summary(Some("Pathogenic"), Some(&["Breast cancer, familial", "Ovarian cancer"]))),
            ("222", summary(Some("Benign, risk factor"), Some(&["not provided"]))),
        ]);
        assert_eq!(significance_cell(&r), "[Pathogenic]|[Benign; risk factor]");
        assert_eq!(
            conditions_cell(&r),
            "[Breast cancer; familial]|[Ovarian cancer]|[not provided]"
        );
    }

    #[test]
    fn test_missing_significance_needs_manual_review() {
        let r = summarised(vec![
            ("111", summary(Some("Pathogenic"), None)),
            ("222", summary(None, None)),
        ]);
        assert_eq!(significance_cell(&r), "manual review needed");
    }

    #[test]
    fn test_missing_or_empty_conditions_collapse() {
        let missing = summarised(vec![
            ("1", summary(Some("Benign"), Some(&["X"]))),
            ("2", summary(Some("Benign"), None)),
        ]);
        assert_eq!(conditions_cell(&missing), "");

        let empty = summarised(vec![("1", summary(Some("Benign"), Some(&[])))]);
        assert_eq!(conditions_cell(&empty), "");
    }

    #[test]
    fn test_output_paths() {
        let date = NaiveDate::from_ymd_opt(2016, 6, 14).unwrap();
        let input = Path::new("/data/run1.output");
        assert_eq!(
            output_path(input, OutputMode::Summary, date, None),
            PathBuf::from("/data/run1_ClinVarResultSummary_20160614.csv")
        );
        assert_eq!(
            output_path(input, OutputMode::Append, date, Some(Path::new("/tmp"))),
            PathBuf::from("/tmp/run1_ClinVarAppended_20160614.output")
        );
    }

    #[test]
    fn test_write_summary() {
        let records = vec![record(&[]), summarised(vec![("1", summary(Some("Pathogenic"), Some(&["A"])))])];
        let mut buf = Vec::new();
        write_summary(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(
            lines[0],
            "Gene Name,Clinical Significance,Detailed Variant Annotation,SNP (rs number),Disease Conditions"
        );
        assert_eq!(lines[1], "BRCA1,not searched,NM_000059.3:c.A123G,rs80357382,");
        assert_eq!(lines[2], "BRCA1,[Pathogenic],NM_000059.3:c.A123G,rs80357382,[A]");
    }

    #[test]
    fn test_write_appended_keeps_source_rows() {
        let columns = ColumnMap { gene: 0, function_type: 1, annotation: 2, snp: 3, chromosome: 4, position: 5 };
        let data = "g\tf\ta\ts\tc\tp\nBRCA1\tmissense\tNM_000059.3:c.A123G\trs1\t13\t100\n";
        let table = read_variants(data.as_bytes(), InputFormat::Output, &columns).unwrap();

        let mut r = VariantRecord::new(table.variants[0].clone(), vec!["t".into()]);
        r.record_identifiers(vec![]);

        let mut buf = Vec::new();
        write_appended(&mut buf, &table, &[r]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0], "g\tf\ta\ts\tc\tp\tClinical Significance\tConditions");
        assert_eq!(lines[1], "BRCA1\tmissense\tNM_000059.3:c.A123G\trs1\t13\t100\tno items found\t");
    }
}
