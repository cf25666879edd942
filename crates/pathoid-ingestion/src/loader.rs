//! Variant table loading.
//!
//! Accepts `.csv` (comma-delimited) and `.output` (tab-delimited, ANNOVAR
//! style) files. The first row is a header; each following row becomes one
//! `VariantInput` built from the configured column positions. Rows may end
//! in `\r`, `\n` or `\r\n`.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::VariantInput;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised file extension for {0}; expected .csv or .output")]
    UnknownFormat(PathBuf),

    #[error("malformed delimited file: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} has {found} columns; {field} column {column} is missing")]
    MissingColumn {
        row: usize,
        field: &'static str,
        column: usize,
        found: usize,
    },
}

/// Zero-based column positions of the fields PathoID reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub gene: usize,
    pub function_type: usize,
    pub annotation: usize,
    pub snp: usize,
    pub chromosome: usize,
    pub position: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            gene: 9,
            function_type: 7,
            annotation: 10,
            snp: 11,
            chromosome: 0,
            position: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `.csv`, comma-delimited
    Csv,
    /// `.output`, tab-delimited
    Output,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv")    => Ok(InputFormat::Csv),
            Some("output") => Ok(InputFormat::Output),
            _ => Err(LoadError::UnknownFormat(path.to_path_buf())),
        }
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            InputFormat::Csv    => b',',
            InputFormat::Output => b'\t',
        }
    }
}

/// The parsed file: source rows are kept so results can be appended to them.
#[derive(Debug, Clone)]
pub struct VariantTable {
    pub format: InputFormat,
    pub header: StringRecord,
    pub rows: Vec<StringRecord>,
    pub variants: Vec<VariantInput>,
}

/// Load a `.csv` or `.output` file from disk.
pub fn load_variants(path: &Path, columns: &ColumnMap) -> Result<VariantTable, LoadError> {
    let format = InputFormat::from_path(path)?;
    info!(path = %path.display(), ?format, "Loading variant file");
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_variants(file, format, columns)
}

/// Parse variant rows from any reader.
pub fn read_variants<R: Read>(
    reader: R,
    format: InputFormat,
    columns: &ColumnMap,
) -> Result<VariantTable, LoadError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header = reader.headers()?.clone();
    let mut rows = Vec::new();
    let mut variants = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |name: &'static str, column: usize| -> Result<String, LoadError> {
            record
                .get(column)
                .map(str::to_string)
                .ok_or(LoadError::MissingColumn {
                    row: row + 1,
                    field: name,
                    column,
                    found: record.len(),
                })
        };

        variants.push(VariantInput {
            row,
            gene: field("gene", columns.gene)?,
            function_type: field("function type", columns.function_type)?,
            raw_annotation: field("annotation", columns.annotation)?,
            snp: field("snp", columns.snp)?,
            chromosome: field("chromosome", columns.chromosome)?,
            position: field("position", columns.position)?,
        });
        rows.push(record);
    }

    debug!(n = variants.len(), "Variant rows loaded");
    Ok(VariantTable { format, header, rows, variants })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Chr\tStart\tEnd\tRef\tAlt\tFunc\tGene.ref\tExonicFunc\tAAChange.ref\tGene\tAnnotation\tSNP";

    fn narrow_columns() -> ColumnMap {
        ColumnMap { gene: 0, function_type: 1, annotation: 2, snp: 3, chromosome: 4, position: 5 }
    }

    #[test]
    fn test_tab_output_with_default_columns() {
        let data = format!(
            "{HEADER}\r13\t32914438\t32914438\tA\tG\texonic\tBRCA2\tnonsynonymous SNV\t.\tBRCA2\tBRCA2:NM_000059:exon11:c.A5744G:p.N1915S\trs80357382\r"
        );
        let table = read_variants(data.as_bytes(), InputFormat::Output, &ColumnMap::default()).unwrap();
        assert_eq!(table.variants.len(), 1);
        let v = &table.variants[0];
        assert_eq!(v.row, 0);
        assert_eq!(v.gene, "BRCA2");
        assert_eq!(v.function_type, "nonsynonymous SNV");
        assert_eq!(v.raw_annotation, "BRCA2:NM_000059:exon11:c.A5744G:p.N1915S");
        assert_eq!(v.snp, "rs80357382");
        assert_eq!(v.chromosome, "13");
        assert_eq!(v.position, "32914438");
        assert_eq!(table.header.len(), 12);
    }

    #[test]
    fn test_csv_with_mixed_line_endings() {
        let data = "g,f,a,s,c,p\nBRCA1,missense,NM_1:c.A1G,rs1,17,100\r\nTP53,stopgain,NM_2:c.C2T,.,17,200\r";
        let table = read_variants(data.as_bytes(), InputFormat::Csv, &narrow_columns()).unwrap();
        let genes: Vec<&str> = table.variants.iter().map(|v| v.gene.as_str()).collect();
        assert_eq!(genes, vec!["BRCA1", "TP53"]);
        assert_eq!(table.variants[1].row, 1);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let table = read_variants("g,f,a,s,c,p\n".as_bytes(), InputFormat::Csv, &narrow_columns()).unwrap();
        assert!(table.variants.is_empty());
    }

    #[test]
    fn test_short_row_is_an_error() {
        let data = "g,f,a,s,c,p\nBRCA1,missense\n";
        match read_variants(data.as_bytes(), InputFormat::Csv, &narrow_columns()) {
            Err(LoadError::MissingColumn { row, field, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(field, "annotation");
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a/b.csv")).unwrap(), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("run.output")).unwrap(), InputFormat::Output);
        assert!(matches!(
            InputFormat::from_path(Path::new("variants.xlsx")),
            Err(LoadError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "g,f,a,s,c,p\rKRAS,missense,NM_004985:c.G35A,rs121913529,12,25398284\r").unwrap();
        let table = load_variants(file.path(), &narrow_columns()).unwrap();
        assert_eq!(table.format, InputFormat::Csv);
        assert_eq!(table.variants[0].raw_annotation, "NM_004985:c.G35A");

        let missing = load_variants(Path::new("/nonexistent/in.csv"), &narrow_columns());
        assert!(matches!(missing, Err(LoadError::Io { .. })));
    }
}
