//! Tabular view shared by every tier, and the CSV / Parquet encoders.

use super::writer::WriteError;
use crate::domain::{Batch, FieldValue, MarketRecord, Source, Tier};
use chrono::{DateTime, Utc};
use polars::prelude::*;

/// One cell of a snapshot table.
pub type Cell = FieldValue;

/// Anything the layered writer can persist.
pub trait Tabular {
    /// Tier this table belongs to. The writer refuses any other.
    fn tier(&self) -> Tier;

    fn source(&self) -> Source;

    /// Timestamp encoded in the snapshot path.
    fn timestamp(&self) -> DateTime<Utc>;

    fn columns(&self) -> Vec<&'static str>;

    /// Rows aligned with [`Tabular::columns`].
    fn rows(&self) -> Vec<Vec<Cell>>;

    fn row_count(&self) -> usize;
}

impl Tabular for Batch {
    fn tier(&self) -> Tier {
        Tier::Bronze
    }

    fn source(&self) -> Source {
        Batch::source(self)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.extracted_at()
    }

    fn columns(&self) -> Vec<&'static str> {
        MarketRecord::header(Batch::source(self))
    }

    fn rows(&self) -> Vec<Vec<Cell>> {
        self.records().iter().map(MarketRecord::row).collect()
    }

    fn row_count(&self) -> usize {
        Batch::row_count(self)
    }
}

pub fn encode_csv<T: Tabular + ?Sized>(table: &T) -> Result<Vec<u8>, WriteError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let ser = |e: csv::Error| WriteError::Serialization(format!("csv: {e}"));

    wtr.write_record(table.columns()).map_err(ser)?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|c| c.to_string())).map_err(ser)?;
    }
    wtr.into_inner()
        .map_err(|e| WriteError::Serialization(format!("csv flush: {e}")))
}

/// Columns holding no text become `Float64`, the rest `String`. Nulls are kept.
pub fn to_dataframe<T: Tabular + ?Sized>(table: &T) -> Result<DataFrame, WriteError> {
    let names = table.columns();
    let rows = table.rows();

    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells = rows.iter().map(|r| r.get(i).unwrap_or(&FieldValue::Null));
            let is_text = rows
                .iter()
                .any(|r| matches!(r.get(i), Some(FieldValue::Text(_))));
            if is_text {
                let values: Vec<Option<String>> = cells
                    .map(|c| if c.is_null() { None } else { Some(c.to_string()) })
                    .collect();
                Column::new((*name).into(), values)
            } else {
                let values: Vec<Option<f64>> = cells.map(FieldValue::as_f64).collect();
                Column::new((*name).into(), values)
            }
        })
        .collect::<Vec<_>>();

    DataFrame::new(columns)
        .map_err(|e| WriteError::Serialization(format!("dataframe creation: {e}")))
}

pub fn encode_parquet<T: Tabular + ?Sized>(table: &T) -> Result<Vec<u8>, WriteError> {
    let mut df = to_dataframe(table)?;
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(&mut df)
        .map_err(|e| WriteError::Serialization(format!("write parquet: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForexFields, RecordFields};
    use chrono::TimeZone;

    fn batch() -> Batch {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let rec = |quote: &str, rate: f64| {
            MarketRecord::new(
                format!("USD/{quote}"),
                ts,
                RecordFields::Forex(ForexFields {
                    base: "USD".into(),
                    quote: quote.into(),
                    rate,
                }),
            )
        };
        Batch::new(Source::Forex, ts, vec![rec("EUR", 0.92), rec("JPY", 150.25)], vec![]).unwrap()
    }

    #[test]
    fn csv_has_header_and_one_line_per_record() {
        let text = String::from_utf8(encode_csv(&batch()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "symbol,timestamp,base,quote,rate");
        assert_eq!(lines[1], "USD/EUR,2024-03-01T00:00:00.000Z,USD,EUR,0.92");
    }

    #[test]
    fn csv_encoding_is_deterministic() {
        assert_eq!(encode_csv(&batch()).unwrap(), encode_csv(&batch()).unwrap());
    }

    #[test]
    fn dataframe_types_follow_cells() {
        let df = to_dataframe(&batch()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("rate").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("quote").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn parquet_bytes_are_readable() {
        let bytes = encode_parquet(&batch()).unwrap();
        let df = ParquetReader::new(std::io::Cursor::new(bytes)).finish().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names().len(), 5);
    }
}
