//! In-memory tabular data exchanged with the dataset: what `save` consumes and `load` returns.

use crate::error::FeatureStoreError;
use crate::model::{FeatureDefinition, FeatureType, FeatureValue, Record};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fmt::Formatter;
use std::io::{Read, Write};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    Float64,
    Utf8,
    Boolean,
    Timestamp,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Utf8 => "utf8",
            DataType::Boolean => "bool",
            DataType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

impl DataType {
    pub fn feature_type(&self) -> Option<FeatureType> {
        match self {
            DataType::Int64 => Some(FeatureType::Integral),
            DataType::Float64 => Some(FeatureType::Fractional),
            DataType::Utf8 | DataType::Timestamp => Some(FeatureType::String),
            DataType::Boolean => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// String form used both for online store records and CSV cells. `None` for nulls.
    pub fn to_feature_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int64(v) => Some(v.to_string()),
            Value::Float64(v) => Some(format_float(*v)),
            Value::Utf8(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Utf8(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Utf8(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table, checking every row against the column layout.
    pub fn try_new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(anyhow!(
                    "Row {} has {} values but the table has {} columns",
                    row_idx,
                    row.len(),
                    columns.len()
                ));
            }
            for (value, column) in row.iter().zip(&columns) {
                match value.data_type() {
                    Some(data_type) if data_type != column.data_type => {
                        return Err(anyhow!(
                            "Row {} column '{}' holds {} but the column is {}",
                            row_idx,
                            column.name,
                            data_type,
                            column.data_type
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows, or the whole table when it is shorter.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn feature_definitions(&self) -> Result<Vec<FeatureDefinition>> {
        self.columns
            .iter()
            .map(|column| {
                column
                    .data_type
                    .feature_type()
                    .map(|feature_type| FeatureDefinition::new(&column.name, feature_type))
                    .ok_or_else(|| {
                        anyhow::Error::from(FeatureStoreError::UnsupportedColumnType {
                            column: column.name.clone(),
                            data_type: column.data_type,
                        })
                    })
            })
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|row| Record {
            values: row
                .iter()
                .zip(&self.columns)
                .filter_map(|(value, column)| {
                    value.to_feature_string().map(|value_as_string| FeatureValue {
                        feature_name: column.name.clone(),
                        value_as_string,
                    })
                })
                .collect(),
        })
    }

    /// Reads a CSV with a header row. Column types are inferred from the non-empty cells:
    /// all integers gives `Int64`, all numbers gives `Float64`, anything else `Utf8`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut cells: Vec<Vec<String>> = vec![];
        for record in csv_reader.records() {
            let record = record.context("Failed to read CSV record")?;
            cells.push(record.iter().map(str::to_string).collect());
        }

        let data_types = (0..headers.len())
            .map(|idx| infer_data_type(cells.iter().map(|row| row[idx].as_str())))
            .collect::<Vec<_>>();
        let rows = cells
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&data_types)
                    .map(|(cell, data_type)| parse_cell(cell, *data_type))
                    .collect()
            })
            .collect();
        let columns = headers
            .into_iter()
            .zip(data_types)
            .map(|(name, data_type)| Column::new(name, data_type))
            .collect();
        Table::try_new(columns, rows)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.column_names())?;
        for row in &self.rows {
            csv_writer.write_record(
                row.iter()
                    .map(|value| value.to_feature_string().unwrap_or_default()),
            )?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Whole numbers keep a trailing `.0` so they read back as floats.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn infer_data_type<'a>(cells: impl Iterator<Item = &'a str>) -> DataType {
    let mut data_type = DataType::Int64;
    for cell in cells.filter(|cell| !cell.is_empty()) {
        if data_type == DataType::Int64 && cell.parse::<i64>().is_ok() {
            continue;
        }
        if cell.parse::<f64>().is_ok() {
            data_type = DataType::Float64;
            continue;
        }
        return DataType::Utf8;
    }
    data_type
}

fn parse_cell(cell: String, data_type: DataType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match data_type {
        DataType::Int64 => cell.parse().map(Value::Int64).unwrap_or(Value::Null),
        DataType::Float64 => cell.parse().map(Value::Float64).unwrap_or(Value::Null),
        _ => Value::Utf8(cell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn shuttles() -> Result<Table> {
        Table::try_new(
            vec![
                Column::new("id", DataType::Int64),
                Column::new("engines", DataType::Float64),
                Column::new("engine_type", DataType::Utf8),
                Column::new("event_time", DataType::Timestamp),
            ],
            vec![
                vec![
                    Value::from(1),
                    Value::from(2.0),
                    Value::from("Quantum"),
                    Value::from(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()),
                ],
                vec![
                    Value::from(2),
                    Value::Null,
                    Value::from("Plasma"),
                    Value::from(Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap()),
                ],
            ],
        )
    }

    #[test]
    fn infers_feature_definitions_from_column_types() -> Result<()> {
        let definitions = shuttles()?.feature_definitions()?;
        assert_eq!(
            definitions,
            vec![
                FeatureDefinition::new("id", FeatureType::Integral),
                FeatureDefinition::new("engines", FeatureType::Fractional),
                FeatureDefinition::new("engine_type", FeatureType::String),
                FeatureDefinition::new("event_time", FeatureType::String),
            ]
        );
        Ok(())
    }

    #[test]
    fn boolean_columns_have_no_feature_type() -> Result<()> {
        let table = Table::try_new(
            vec![Column::new("d_check_complete", DataType::Boolean)],
            vec![vec![Value::from(true)]],
        )?;
        let err = table.feature_definitions().unwrap_err();
        assert!(err.to_string().contains("d_check_complete"));
        Ok(())
    }

    #[test]
    fn rejects_rows_that_do_not_match_columns() {
        let short_row = Table::try_new(
            vec![Column::new("id", DataType::Int64), Column::new("x", DataType::Utf8)],
            vec![vec![Value::from(1)]],
        );
        assert!(short_row.is_err());

        let wrong_type = Table::try_new(
            vec![Column::new("id", DataType::Int64)],
            vec![vec![Value::from("one")]],
        );
        assert!(wrong_type.is_err());
    }

    #[test]
    fn records_skip_nulls_and_format_timestamps() -> Result<()> {
        let records = shuttles()?.records().collect::<Vec<_>>();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("event_time"), Some("2023-01-02T03:04:05Z"));
        assert_eq!(records[0].get("engines"), Some("2.0"));
        assert_eq!(records[1].get("engines"), None);
        assert_eq!(records[1].values.len(), 3);
        Ok(())
    }

    #[test]
    fn head_truncates() -> Result<()> {
        let table = shuttles()?;
        assert_eq!(table.head(1).num_rows(), 1);
        assert_eq!(table.head(10).num_rows(), 2);
        assert_eq!(table.head(1).columns(), table.columns());
        Ok(())
    }

    #[test]
    fn reads_csv_with_type_inference() -> Result<()> {
        let project_dir = env!("CARGO_MANIFEST_DIR");
        let csv_path = format!("{}/test_data/shuttles.csv", project_dir);
        let table = Table::from_csv_reader(fs::File::open(csv_path)?)?;
        assert_eq!(
            table.columns(),
            &[
                Column::new("id", DataType::Int64),
                Column::new("shuttle_location", DataType::Utf8),
                Column::new("engines", DataType::Float64),
                Column::new("passenger_capacity", DataType::Int64),
                Column::new("event_time", DataType::Float64),
            ]
        );
        assert_eq!(table.num_rows(), 15);
        assert_eq!(table.rows()[0][1], Value::from("Sao Tome and Principe"));
        assert_eq!(table.rows()[2][2], Value::Null);
        Ok(())
    }

    #[test]
    fn csv_written_by_table_reads_back() -> Result<()> {
        let input = "id,name,score\n1,\"a, b\",0.5\n2,,1.5\n";
        let table = Table::from_csv_reader(input.as_bytes())?;
        let mut out = Vec::new();
        table.write_csv(&mut out)?;
        assert_eq!(String::from_utf8(out)?, input);
        Ok(())
    }

    #[test]
    fn whole_number_floats_stay_floats_through_csv() -> Result<()> {
        let table = Table::try_new(
            vec![
                Column::new("engines", DataType::Float64),
                Column::new("event_time", DataType::Float64),
            ],
            vec![
                vec![Value::from(2.0), Value::from(1700000000.0)],
                vec![Value::from(-3.0), Value::from(1700000060.5)],
            ],
        )?;
        let mut out = Vec::new();
        table.write_csv(&mut out)?;
        assert_eq!(
            String::from_utf8(out.clone())?,
            "engines,event_time\n2.0,1700000000.0\n-3.0,1700000060.5\n"
        );
        assert_eq!(Table::from_csv_reader(out.as_slice())?, table);
        Ok(())
    }
}
