use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use parquet::basic::{LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type;
use serde_json::{Map, Value};
use tracing::info;

use crate::normalize::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            other => bail!("unknown output format: {other}"),
        }
    }
}

pub struct ExportReport {
    pub rows: usize,
    pub files: Vec<PathBuf>,
}

/// Writes `<prefix>.<ext>` for every requested format.
pub fn write_table_formats(
    table: &Table,
    prefix: &Path,
    formats: &[OutputFormat],
) -> Result<ExportReport> {
    let mut files = Vec::new();
    for &format in formats {
        let path = with_suffix(prefix, &format!(".{}", format.extension()));
        write_table(table, &path, format)?;
        info!(file = %path.display(), rows = table.len(), "table saved");
        files.push(path);
    }
    Ok(ExportReport {
        rows: table.len(),
        files,
    })
}

pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn write_table(table: &Table, path: &Path, format: OutputFormat) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    match format {
        OutputFormat::Json => write_json(table, path),
        OutputFormat::Csv => write_csv(table, path),
        OutputFormat::Parquet => write_parquet(table, path),
    }
}

fn write_json(table: &Table, path: &Path) -> Result<()> {
    let records: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let obj: Map<String, Value> = table
                .columns
                .iter()
                .map(|col| {
                    let value = row
                        .get(col)
                        .map(|v| Value::String(v.to_string()))
                        .unwrap_or(Value::Null);
                    (col.clone(), value)
                })
                .collect();
            Value::Object(obj)
        })
        .collect();
    let json = serde_json::to_string_pretty(&records).context("serialize table json")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(&table.columns)
        .context("write csv header")?;
    for row in &table.rows {
        let cells = table.columns.iter().map(|col| row.get(col).unwrap_or(""));
        writer.write_record(cells).context("write csv row")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

// Every column is an optional UTF-8 string; a missing cell is a null.
fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    if table.columns.is_empty() {
        bail!("cannot write parquet without columns: {}", path.display());
    }
    let fields = table
        .columns
        .iter()
        .map(|col| {
            Type::primitive_type_builder(col, PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::OPTIONAL)
                .with_logical_type(Some(LogicalType::String))
                .build()
                .map(Arc::new)
        })
        .collect::<Result<Vec<_>, _>>()
        .context("build parquet columns")?;
    let schema = Type::group_type_builder("schema")
        .with_fields(fields)
        .build()
        .context("build parquet schema")?;

    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer = SerializedFileWriter::new(file, Arc::new(schema), props)
        .context("open parquet writer")?;
    let mut row_group = writer.next_row_group().context("start row group")?;
    for col in &table.columns {
        let Some(mut column) = row_group.next_column().context("next column")? else {
            break;
        };
        let mut values = Vec::with_capacity(table.rows.len());
        let mut levels = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            match row.get(col) {
                Some(v) => {
                    values.push(ByteArray::from(v));
                    levels.push(1i16);
                }
                None => levels.push(0i16),
            }
        }
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, Some(levels.as_slice()), None)
            .with_context(|| format!("write column {col}"))?;
        column.close().context("close column")?;
    }
    row_group.close().context("close row group")?;
    writer.close().context("close parquet file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use parquet::record::RowAccessor;

    fn sample() -> Table {
        let a: Record = [("team_name", "Arsenal"), ("gf", "2")].into_iter().collect();
        let b: Record = [("team_name", "Chelsea"), ("notes", "a, \"quoted\" note")]
            .into_iter()
            .collect();
        Table::new(vec![a, b], &["team_name"], &[])
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" parquet".parse::<OutputFormat>().unwrap(), OutputFormat::Parquet);
        assert!("xlsx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn writes_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("fixtures_dataframe");
        let report = write_table_formats(
            &sample(),
            &prefix,
            &[OutputFormat::Json, OutputFormat::Csv, OutputFormat::Parquet],
        )
        .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.files.len(), 3);

        let json: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(prefix.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(json[0]["gf"], "2");
        assert_eq!(json[0]["notes"], Value::Null);

        let mut reader = csv::Reader::from_path(prefix.with_extension("csv")).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["team_name", "gf", "notes"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[1][2], "a, \"quoted\" note");

        let file = File::open(prefix.with_extension("parquet")).unwrap();
        let reader = SerializedFileReader::new(file).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 2);
        let rows: Vec<_> = reader
            .get_row_iter(None)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[1].get_string(0).unwrap(), "Chelsea");
        assert_eq!(rows[0].get_string(1).unwrap(), "2");
    }
}
