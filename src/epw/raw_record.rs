//! Parsing of the two-section CSV files served by the archive.
//!
//! Line 1 holds metadata field names and line 2 their values. Line 3 is the
//! header of the hourly data table, followed by the rows themselves.

use crate::epw::error::ConversionError;
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Site description taken from the metadata section.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMetadata {
    pub source: String,
    pub latitude: String,
    pub longitude: String,
    pub time_zone: String,
    pub elevation: String,
}

/// A parsed raw archive file. Every data column is kept as text.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub path: PathBuf,
    pub metadata: SiteMetadata,
    pub data: DataFrame,
}

impl RawRecord {
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, ConversionError> {
        let split = data_section_offset(bytes)
            .ok_or_else(|| ConversionError::MissingSections(path.to_path_buf()))?;
        let (meta_bytes, data_bytes) = bytes.split_at(split);

        let meta = read_text_frame(meta_bytes, path)?;
        let metadata = SiteMetadata {
            source: metadata_field(&meta, &["Source"], path)?,
            latitude: metadata_field(&meta, &["Latitude"], path)?,
            longitude: metadata_field(&meta, &["Longitude"], path)?,
            time_zone: metadata_field(&meta, &["Local Time Zone", "Time Zone"], path)?,
            elevation: metadata_field(&meta, &["Elevation"], path)?,
        };

        let data = drop_empty_columns(read_text_frame(data_bytes, path)?)
            .map_err(|source| ConversionError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            data,
        })
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.data.get_column_index(name).is_some()
    }

    /// Raw text of a cell, trimmed. `None` for a missing column or empty cell.
    pub fn text(&self, column: &str, row: usize) -> Option<&str> {
        self.data
            .column(column)
            .ok()
            .and_then(|c| c.str().ok())
            .and_then(|ca| ca.get(row))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numeric view of a column. `None` when the column is absent; unparseable
    /// cells become `None` entries.
    pub fn numeric(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let ca = self.data.column(column).ok()?.str().ok()?;
        Some(
            ca.into_iter()
                .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
                .collect(),
        )
    }

    /// Integer cell of a required column.
    pub fn required_int(&self, column: &str, row: usize) -> Result<i64, ConversionError> {
        if !self.has_column(column) {
            return Err(ConversionError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            });
        }
        let text = self.text(column, row).unwrap_or_default();
        text.parse::<f64>()
            .map(|v| v as i64)
            .map_err(|_| ConversionError::InvalidValue {
                path: self.path.clone(),
                column: column.to_string(),
                value: text.to_string(),
            })
    }
}

/// Byte offset at which the data section starts, right after the second line.
fn data_section_offset(bytes: &[u8]) -> Option<usize> {
    let mut newlines = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .map(|(i, _)| i);
    newlines.next()?;
    let second = newlines.next()?;
    (second + 1 < bytes.len()).then_some(second + 1)
}

fn read_text_frame(bytes: &[u8], path: &Path) -> Result<DataFrame, ConversionError> {
    // A zero-length inference window reads every column as a string.
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .map_err(|source| ConversionError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn metadata_field(
    meta: &DataFrame,
    names: &[&str],
    path: &Path,
) -> Result<String, ConversionError> {
    names
        .iter()
        .filter_map(|name| meta.column(name).ok())
        .filter_map(|c| c.str().ok().and_then(|ca| ca.get(0)).map(str::trim))
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConversionError::MissingMetadata {
            path: path.to_path_buf(),
            field: names[0].to_string(),
        })
}

/// Archive files carry trailing columns that are empty in every row.
fn drop_empty_columns(df: DataFrame) -> PolarsResult<DataFrame> {
    let keep: Vec<PlSmallStr> = df
        .get_columns()
        .iter()
        .filter(|c| c.len() == 0 || c.null_count() < c.len())
        .map(|c| c.name().clone())
        .collect();
    df.select(keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Source,Location ID,City,State,Country,Latitude,Longitude,Time Zone,Elevation,Local Time Zone,Extra
NSRDB,1127013,-,-,-,42.45,-76.46,0,253,-5,
Year,Month,Day,Hour,Minute,Temperature,Dew Point,Empty
2022,1,1,0,30,-3.1,-6.0,
2022,1,1,1,30,-3.4,,
";

    #[test]
    fn test_parse_sections() -> Result<(), ConversionError> {
        let record = RawRecord::parse(SAMPLE.as_bytes(), Path::new("sample.csv"))?;
        assert_eq!(record.metadata.source, "NSRDB");
        assert_eq!(record.metadata.latitude, "42.45");
        assert_eq!(record.metadata.longitude, "-76.46");
        // Local time zone wins over the generic one.
        assert_eq!(record.metadata.time_zone, "-5");
        assert_eq!(record.metadata.elevation, "253");
        assert_eq!(record.height(), 2);
        assert_eq!(record.required_int("Year", 0)?, 2022);
        assert_eq!(record.text("Temperature", 1), Some("-3.4"));
        assert_eq!(record.text("Dew Point", 1), None);
        Ok(())
    }

    #[test]
    fn test_all_null_columns_are_dropped() -> Result<(), ConversionError> {
        let record = RawRecord::parse(SAMPLE.as_bytes(), Path::new("sample.csv"))?;
        assert!(!record.has_column("Empty"));
        // Partially empty columns survive.
        assert!(record.has_column("Dew Point"));
        let dew = record.numeric("Dew Point").unwrap();
        assert_eq!(dew, vec![Some(-6.0), None]);
        Ok(())
    }

    #[test]
    fn test_missing_data_section() {
        let err = RawRecord::parse(b"Source,Latitude\nNSRDB,1\n", Path::new("short.csv"))
            .unwrap_err();
        assert!(matches!(err, ConversionError::MissingSections(_)));
    }

    #[test]
    fn test_missing_metadata_field() {
        let csv = "Source,Longitude\nNSRDB,1\nYear\n2022\n";
        let err = RawRecord::parse(csv.as_bytes(), Path::new("meta.csv")).unwrap_err();
        assert!(
            matches!(err, ConversionError::MissingMetadata { ref field, .. } if field == "Latitude")
        );
    }
}
