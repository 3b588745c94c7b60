//! Sheet import boundary
//!
//! Turns exported sheet rows into the typed shapes the level engine reads.
//! Two sheets are understood:
//! - `OHLC`: columns Session (1 or 2), Open, High, Low, Close
//! - `Zones`: columns Level, Label, Type, Color
//!
//! Bad cells are reported as `ImportError` instead of becoming NaN levels.

use std::collections::HashMap;
use std::io::Read;

use thiserror::Error;
use tracing::{debug, info};

use crate::types::{DataSource, Ohlc, SessionData, Zone, ZoneType};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Row {row}: missing column {column}")]
    MissingColumn { row: usize, column: &'static str },
    #[error("Row {row}: {column} is not a number: {value:?}")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("Row {row}: unknown zone type {value:?}")]
    InvalidZoneType { row: usize, value: String },
}

/// One sheet row keyed by lowercased header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn new<K: AsRef<str>, V: Into<String>>(cells: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            cells: cells
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into().trim().to_string()))
                .collect(),
        }
    }

    /// Non-empty cell for a header, matched case-insensitively
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(&column.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn number(&self, row: usize, column: &'static str) -> Result<f64, ImportError> {
        let value = self.get(column).ok_or(ImportError::MissingColumn { row, column })?;
        parse_number(value).ok_or_else(|| ImportError::InvalidNumber {
            row,
            column,
            value: value.to_string(),
        })
    }
}

// Finite numbers only; thousands separators are tolerated
fn parse_number(value: &str) -> Option<f64> {
    value
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Read a headered CSV export into rows
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<SheetRow>, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(SheetRow::new(headers.iter().zip(record.iter())));
    }

    debug!("Read {} sheet rows ({} columns)", rows.len(), headers.len());
    Ok(rows)
}

/// Replace session 1 / 2 in `base` from OHLC rows.
///
/// Rows whose Session cell is not 1 or 2 are ignored; a later row for the
/// same session wins.
pub fn parse_ohlc_rows(rows: &[SheetRow], base: &SessionData) -> Result<SessionData, ImportError> {
    let mut data = base.clone();

    for (i, row) in rows.iter().enumerate() {
        let row_no = i + 1;
        let session = match row.get("Session").and_then(parse_number) {
            Some(s) if s == 1.0 => 1,
            Some(s) if s == 2.0 => 2,
            _ => {
                debug!("Skipping OHLC row {} without session 1/2", row_no);
                continue;
            }
        };

        let ohlc = Ohlc::new(
            row.number(row_no, "Open")?,
            row.number(row_no, "High")?,
            row.number(row_no, "Low")?,
            row.number(row_no, "Close")?,
        );

        if session == 1 {
            data.session1 = ohlc;
        } else {
            data.session2 = ohlc;
        }
    }

    Ok(data)
}

const DEFAULT_ZONE_COLOR: &str = "#000";

/// Zones from a Zones sheet. Level is required; Label defaults to "Zone",
/// Type to neural, Color to black.
pub fn parse_zone_rows(rows: &[SheetRow]) -> Result<Vec<Zone>, ImportError> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row.cells.values().any(|v| !v.is_empty()))
        .map(|(i, row)| {
            let row_no = i + 1;
            let zone_type = match row.get("Type").map(str::to_lowercase).as_deref() {
                None | Some("neural") => ZoneType::Neural,
                Some("supply") => ZoneType::Supply,
                Some("demand") => ZoneType::Demand,
                Some(other) => {
                    return Err(ImportError::InvalidZoneType {
                        row: row_no,
                        value: other.to_string(),
                    })
                }
            };

            Ok(Zone {
                level: row.number(row_no, "Level")?,
                zone_type,
                percentage: 0.0,
                label: Some(row.get("Label").unwrap_or("Zone").to_string()),
                rule_id: None,
                color: Some(row.get("Color").unwrap_or(DEFAULT_ZONE_COLOR).to_string()),
            })
        })
        .collect()
}

/// Build a new `SessionData` from OHLC and Zones exports.
///
/// A missing Zones export keeps the zones already in `base`. The result is
/// only returned whole, so a failed import leaves the caller's snapshot as it
/// was.
pub fn import_workbook<R1: Read, R2: Read>(
    ohlc: Option<R1>,
    zones: Option<R2>,
    base: &SessionData,
    source: DataSource,
) -> Result<SessionData, ImportError> {
    let mut data = match ohlc {
        Some(reader) => parse_ohlc_rows(&read_csv_rows(reader)?, base)?,
        None => base.clone(),
    };

    if let Some(reader) = zones {
        data.excel_zones = parse_zone_rows(&read_csv_rows(reader)?)?;
    }
    data.data_source = source;

    info!(
        "Imported {} data: pivots {:.2} / {:.2}, {} zones",
        source,
        data.session1.pivot(),
        data.session2.pivot(),
        data.excel_zones.len()
    );

    Ok(data)
}

/// Sheet id from a `.../spreadsheets/d/<id>/...` URL
pub fn extract_sheet_id(url: &str) -> Option<String> {
    let start = url.find("/d/")? + 3;
    let rest = &url[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let id = &rest[..end];
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_SESSION1, DEFAULT_SESSION2};

    const OHLC_CSV: &str = "Session,Open,High,Low,Close\n\
        1,21500,21600,21450,21550\n\
        2,21550,21650,21520,21620\n";

    #[test]
    fn test_read_ohlc_export() {
        let rows = read_csv_rows(OHLC_CSV.as_bytes()).unwrap();
        let base = SessionData {
            session1: Ohlc::new(0.0, 0.0, 0.0, 0.0),
            session2: Ohlc::new(0.0, 0.0, 0.0, 0.0),
            ..Default::default()
        };

        let data = parse_ohlc_rows(&rows, &base).unwrap();
        assert_eq!(data.session1, DEFAULT_SESSION1);
        assert_eq!(data.session2, DEFAULT_SESSION2);
    }

    #[test]
    fn test_headers_case_insensitive_and_other_sessions_skipped() {
        let csv = "session,OPEN,high,Low,close\n3,1,1,1,1\n,5,5,5,5\n2.0,10,12,9,11\n";
        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        let data = parse_ohlc_rows(&rows, &SessionData::default()).unwrap();

        assert_eq!(data.session1, DEFAULT_SESSION1);
        assert_eq!(data.session2, Ohlc::new(10.0, 12.0, 9.0, 11.0));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let csv = "Session,Open,High,Low,Close\n1,21500,n/a,21450,21550\n";
        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        let err = parse_ohlc_rows(&rows, &SessionData::default()).unwrap_err();

        match err {
            ImportError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 1);
                assert_eq!(column, "High");
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_close_is_an_error() {
        let csv = "Session,Open,High,Low\n2,1,2,0.5\n";
        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        assert!(matches!(
            parse_ohlc_rows(&rows, &SessionData::default()),
            Err(ImportError::MissingColumn { row: 1, column: "Close" })
        ));
    }

    #[test]
    fn test_zone_rows() {
        let csv = "Level,Label,Type,Color\n\
            21800,Weekly high,Supply,#f00\n\
            \"21,400\",,DEMAND,\n\
            21600,Mid,,#0f0\n";
        let zones = parse_zone_rows(&read_csv_rows(csv.as_bytes()).unwrap()).unwrap();

        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].level, 21800.0);
        assert_eq!(zones[0].zone_type, ZoneType::Supply);
        assert_eq!(zones[0].color.as_deref(), Some("#f00"));
        assert_eq!(zones[1].level, 21400.0);
        assert_eq!(zones[1].label.as_deref(), Some("Zone"));
        assert_eq!(zones[1].zone_type, ZoneType::Demand);
        assert_eq!(zones[1].color.as_deref(), Some("#000"));
        assert_eq!(zones[2].zone_type, ZoneType::Neural);
        assert!(zones.iter().all(|z| z.percentage == 0.0 && z.rule_id.is_none()));
    }

    #[test]
    fn test_zone_type_and_level_validated() {
        let bad_type = read_csv_rows("Level,Type\n100,resistance\n".as_bytes()).unwrap();
        assert!(matches!(
            parse_zone_rows(&bad_type),
            Err(ImportError::InvalidZoneType { row: 1, .. })
        ));

        let no_level = read_csv_rows("Level,Label\n,Orphan\n".as_bytes()).unwrap();
        assert!(matches!(
            parse_zone_rows(&no_level),
            Err(ImportError::MissingColumn { column: "Level", .. })
        ));

        let nan_level = read_csv_rows("Level\nNaN\n".as_bytes()).unwrap();
        assert!(matches!(parse_zone_rows(&nan_level), Err(ImportError::InvalidNumber { .. })));
    }

    #[test]
    fn test_import_workbook() {
        let zones = "Level,Label\n22000,Far\n";
        let data = import_workbook(
            Some(OHLC_CSV.as_bytes()),
            Some(zones.as_bytes()),
            &SessionData::default(),
            DataSource::Excel,
        )
        .unwrap();

        assert_eq!(data.data_source, DataSource::Excel);
        assert_eq!(data.excel_zones.len(), 1);
        assert_eq!(data.excel_zones[0].label.as_deref(), Some("Far"));
    }

    #[test]
    fn test_import_without_zones_keeps_existing() {
        let mut base = SessionData::default();
        base.excel_zones = parse_zone_rows(&[SheetRow::new([("Level", "1")])]).unwrap();

        let data = import_workbook(Some(OHLC_CSV.as_bytes()), None::<&[u8]>, &base, DataSource::GoogleSheet).unwrap();
        assert_eq!(data.excel_zones, base.excel_zones);
        assert_eq!(data.data_source, DataSource::GoogleSheet);
    }

    #[test]
    fn test_extract_sheet_id() {
        assert_eq!(
            extract_sheet_id("https://docs.google.com/spreadsheets/d/1AbC-xyz_9/edit#gid=0").as_deref(),
            Some("1AbC-xyz_9")
        );
        assert_eq!(
            extract_sheet_id("https://docs.google.com/spreadsheets/d/XYZ").as_deref(),
            Some("XYZ")
        );
        assert_eq!(extract_sheet_id("https://example.com/sheet"), None);
        assert_eq!(extract_sheet_id("https://docs.google.com/spreadsheets/d//edit"), None);
    }
}
