// src/table/read.rs

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::csv::{reader::Format as CsvFormat, ReaderBuilder as CsvReaderBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::json::reader::{infer_json_schema, infer_json_schema_from_iterator};
use arrow::json::ReaderBuilder as JsonReaderBuilder;
use arrow::record_batch::RecordBatch;
use calamine::{open_workbook_auto, Data, Reader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use regex::Regex;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufReader, Seek},
    path::Path,
    sync::Arc,
};
use tracing::debug;

use super::Format;
use crate::error::{Error, Result};

/// Field values treated as missing in delimited text.
const NULL_TOKENS: &str = r"^(|NA|N/A|NaN|nan|null|NULL|None|#N/A|<NA>)$";

/// Parse the file at `path` according to `format`. `filename` is used for error context.
pub fn read_batch(path: &Path, filename: &str, format: Format) -> Result<RecordBatch> {
    match format {
        Format::Csv => read_delimited(path, filename, b','),
        Format::Tsv => read_delimited(path, filename, b'\t'),
        Format::Spreadsheet => read_spreadsheet(path, filename),
        Format::Json => read_json_array(path, filename),
        Format::JsonLines => read_json_lines(path, filename),
        Format::Parquet => read_parquet(path, filename),
    }
}

fn collect_batches<I>(filename: &str, schema: SchemaRef, batches: I) -> Result<RecordBatch>
where
    I: Iterator<Item = std::result::Result<RecordBatch, ArrowError>>,
{
    let batches = batches
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::parse(filename, e))?;
    concat_batches(&schema, &batches).map_err(|e| Error::parse(filename, e))
}

/// Header row plus records; the schema is inferred over the whole file.
/// Missing trailing fields read as null.
fn read_delimited(path: &Path, filename: &str, delimiter: u8) -> Result<RecordBatch> {
    let null_regex =
        Regex::new(NULL_TOKENS).map_err(|e| Error::Internal(format!("null token pattern: {e}")))?;
    let mut file = File::open(path).map_err(|e| Error::parse(filename, e))?;

    let format = CsvFormat::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .with_truncated_rows(true)
        .with_null_regex(null_regex.clone());
    let (schema, records) = format
        .infer_schema(&mut file, None)
        .map_err(|e| Error::parse(filename, e))?;
    debug!(records, fields = schema.fields().len(), "inferred delimited schema");
    file.rewind().map_err(|e| Error::parse(filename, e))?;

    let schema = Arc::new(schema);
    let reader = CsvReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(delimiter)
        .with_truncated_rows(true)
        .with_null_regex(null_regex)
        .build(file)
        .map_err(|e| Error::parse(filename, e))?;

    collect_batches(filename, schema, reader)
}

/// A top-level JSON array of objects.
fn read_json_array(path: &Path, filename: &str) -> Result<RecordBatch> {
    let file = File::open(path).map_err(|e| Error::parse(filename, e))?;
    let values: Vec<Value> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::parse(filename, e))?;

    let schema = Arc::new(
        infer_json_schema_from_iterator(values.iter().map(Ok))
            .map_err(|e| Error::parse(filename, e))?,
    );
    if values.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut decoder = JsonReaderBuilder::new(schema.clone())
        .with_batch_size(values.len())
        .build_decoder()
        .map_err(|e| Error::parse(filename, e))?;
    decoder
        .serialize(&values)
        .map_err(|e| Error::parse(filename, e))?;
    let batch = decoder.flush().map_err(|e| Error::parse(filename, e))?;
    Ok(batch.unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

/// One JSON object per line.
fn read_json_lines(path: &Path, filename: &str) -> Result<RecordBatch> {
    let file = File::open(path).map_err(|e| Error::parse(filename, e))?;
    let mut reader = BufReader::new(file);
    let (schema, _) = infer_json_schema(&mut reader, None).map_err(|e| Error::parse(filename, e))?;
    reader.rewind().map_err(|e| Error::parse(filename, e))?;

    let schema = Arc::new(schema);
    let batches = JsonReaderBuilder::new(schema.clone())
        .build(reader)
        .map_err(|e| Error::parse(filename, e))?;
    collect_batches(filename, schema, batches)
}

fn read_parquet(path: &Path, filename: &str) -> Result<RecordBatch> {
    let file = File::open(path).map_err(|e| Error::parse(filename, e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| Error::parse(filename, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| Error::parse(filename, e))?;
    collect_batches(filename, schema, reader)
}

/// First worksheet; first row is the header.
fn read_spreadsheet(path: &Path, filename: &str) -> Result<RecordBatch> {
    let mut workbook = open_workbook_auto(path).map_err(|e| Error::parse(filename, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::parse(filename, "workbook has no worksheets"))?
        .map_err(|e| Error::parse(filename, e))?;

    batch_from_cells(filename, range.rows())
}

static EMPTY_CELL: Data = Data::Empty;

enum Cell {
    Null,
    Number(f64),
    Bool(bool),
    Text(String),
}

fn classify(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Null,
        Data::String(s) if s.trim().is_empty() => Cell::Null,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}

/// Trim whitespace and strip outer quotes from a header cell.
fn clean_header(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build a batch from spreadsheet rows. A column is Float64 when every
/// non-empty cell is numeric, Boolean when every one is a bool, else Utf8.
fn batch_from_cells<'a, I>(filename: &str, mut rows: I) -> Result<RecordBatch>
where
    I: Iterator<Item = &'a [Data]>,
{
    let Some(header) = rows.next() else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };
    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match classify(cell) {
            Cell::Null => format!("column_{i}"),
            _ => clean_header(&cell.to_string()),
        })
        .collect();
    if names.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }
    let body: Vec<&[Data]> = rows.collect();

    let mut fields = Vec::with_capacity(names.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let cells: Vec<&Data> = body
            .iter()
            .map(|row| row.get(idx).unwrap_or(&EMPTY_CELL))
            .collect();
        let classified: Vec<Cell> = cells.iter().map(|c| classify(c)).collect();

        let all_numeric = classified
            .iter()
            .all(|c| matches!(c, Cell::Null | Cell::Number(_)));
        let all_bool = classified
            .iter()
            .all(|c| matches!(c, Cell::Null | Cell::Bool(_)));
        let any_value = classified.iter().any(|c| !matches!(c, Cell::Null));

        let (data_type, array): (DataType, ArrayRef) = if any_value && all_numeric {
            let values: Vec<Option<f64>> = classified
                .iter()
                .map(|c| match c {
                    Cell::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            (DataType::Float64, Arc::new(Float64Array::from(values)))
        } else if any_value && all_bool {
            let values: Vec<Option<bool>> = classified
                .iter()
                .map(|c| match c {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            (DataType::Boolean, Arc::new(BooleanArray::from(values)))
        } else {
            let values: Vec<Option<String>> = classified
                .iter()
                .zip(&cells)
                .map(|(c, raw)| match c {
                    Cell::Null => None,
                    Cell::Text(s) => Some(s.clone()),
                    _ => Some(raw.to_string()),
                })
                .collect();
            (DataType::Utf8, Arc::new(StringArray::from(values)))
        };

        fields.push(Field::new(name, data_type, true));
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| Error::parse(filename, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{read_table, to_records};
    use arrow::array::{Array, Int64Array};
    use parquet::arrow::ArrowWriter;
    use serde_json::json;
    use std::{fs, io::Write};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn records(batch: &RecordBatch) -> Value {
        Value::Array(
            to_records(batch)
                .unwrap()
                .into_iter()
                .map(Value::Object)
                .collect(),
        )
    }

    #[test]
    fn test_csv_types_and_null_tokens() {
        let tmp = tempdir().unwrap();
        fs::write(
            tmp.path().join("iris.csv"),
            "sepal_length,species,petals\n5.1,setosa,3\n,versicolor,NA\n6.3,,4\n",
        )
        .unwrap();

        let table = read_table(tmp.path(), "iris.csv").unwrap();
        let schema = table.batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Int64);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.batch.column(0).null_count(), 1);
        assert_eq!(table.batch.column(1).null_count(), 1);
        assert_eq!(table.batch.column(2).null_count(), 1);
    }

    #[test]
    fn test_short_rows_pad_with_nulls() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("flowers.csv"), "a,b\n1,2\n3\n").unwrap();

        let table = read_table(tmp.path(), "flowers.csv").unwrap();
        assert_eq!(records(&table.batch), json!([{"a": 1, "b": 2}, {"a": 3, "b": null}]));

        let cleaned = crate::table::drop_null_rows(&table).unwrap();
        assert_eq!(records(&cleaned.batch), json!([{"a": 1, "b": 2}]));
    }

    #[test]
    fn test_tsv_uses_tab_delimiter() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("f.tsv"), "a\tb\n1\tx,y\n").unwrap();

        let table = read_table(tmp.path(), "f.tsv").unwrap();
        assert_eq!(records(&table.batch), json!([{"a": 1, "b": "x,y"}]));
    }

    #[test]
    fn test_malformed_csv_is_parse_error() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("bad.csv"), b"a,b\n1,2\n3,\xff\xfe\n").unwrap();
        assert!(matches!(
            read_table(tmp.path(), "bad.csv"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_json_array_of_objects() {
        let tmp = tempdir().unwrap();
        fs::write(
            tmp.path().join("f.json"),
            r#"[{"a": 1, "b": 2}, {"a": 3, "b": null}, {"a": 5}]"#,
        )
        .unwrap();

        let table = read_table(tmp.path(), "f.json").unwrap();
        assert_eq!(table.num_rows(), 3);
        let b = table
            .batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![Some(2), None, None]);
    }

    #[test]
    fn test_json_that_is_not_records_is_parse_error() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("obj.json"), r#"{"a": 1}"#).unwrap();
        fs::write(tmp.path().join("nums.json"), "[1, 2, 3]").unwrap();
        fs::write(tmp.path().join("broken.json"), "[{\"a\": ").unwrap();

        for name in ["obj.json", "nums.json", "broken.json"] {
            assert!(
                matches!(read_table(tmp.path(), name), Err(Error::Parse { .. })),
                "{name}"
            );
        }
    }

    #[test]
    fn test_json_lines() {
        let tmp = tempdir().unwrap();
        fs::write(
            tmp.path().join("f.jsonl"),
            "{\"a\": 1, \"b\": \"x\"}\n{\"a\": 2}\n",
        )
        .unwrap();

        let table = read_table(tmp.path(), "f.jsonl").unwrap();
        assert_eq!(
            records(&table.batch),
            json!([{"a": 1, "b": "x"}, {"a": 2, "b": null}])
        );
    }

    #[test]
    fn test_parquet_round_trips_through_reader() {
        let tmp = tempdir().unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("x"), None])),
            ],
        )
        .unwrap();
        let file = File::create(tmp.path().join("f.parquet")).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = read_table(tmp.path(), "f.parquet").unwrap();
        assert_eq!(table.batch.columns(), batch.columns());
        assert_eq!(records(&table.batch), json!([{"a": 1, "b": "x"}, {"a": 2, "b": null}]));
    }

    #[test]
    fn test_garbage_parquet_is_parse_error() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("f.parquet"), "definitely not parquet").unwrap();
        assert!(matches!(
            read_table(tmp.path(), "f.parquet"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_cells_infer_column_types() {
        let rows = vec![
            vec![
                Data::String("length".into()),
                Data::String(" \"species\" ".into()),
                Data::String("valid".into()),
                Data::Empty,
            ],
            vec![
                Data::Float(5.1),
                Data::String("setosa".into()),
                Data::Bool(true),
                Data::Int(7),
            ],
            vec![
                Data::Int(6),
                Data::Empty,
                Data::Empty,
                Data::String("seven".into()),
            ],
        ];
        let batch = batch_from_cells("f.xlsx", rows.iter().map(|r| r.as_slice())).unwrap();

        let schema = batch.schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["length", "species", "valid", "column_3"]);
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Boolean);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
        assert_eq!(
            records(&batch),
            json!([
                {"length": 5.1, "species": "setosa", "valid": true, "column_3": "7"},
                {"length": 6.0, "species": null, "valid": null, "column_3": "seven"}
            ])
        );
    }

    #[test]
    fn test_empty_sheet_is_empty_table() {
        let rows: Vec<Vec<Data>> = Vec::new();
        let batch = batch_from_cells("f.xlsx", rows.iter().map(|r| r.as_slice())).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }

    /// Smallest workbook calamine will open: one sheet of inline strings and numbers.
    fn write_xlsx(path: &Path) {
        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#,
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>a</t></is></c><c r="B1" t="inlineStr"><is><t>b</t></is></c></row><row r="2"><c r="A2"><v>1</v></c><c r="B2"><v>2</v></c></row><row r="3"><c r="A3"><v>3</v></c></row></sheetData></worksheet>"#,
            ),
        ];

        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in parts {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_xlsx_first_sheet() {
        let tmp = tempdir().unwrap();
        write_xlsx(&tmp.path().join("flowers.xlsx"));

        let table = read_table(tmp.path(), "flowers.xlsx").unwrap();
        assert_eq!(table.format, Format::Spreadsheet);
        assert_eq!(
            records(&table.batch),
            json!([{"a": 1.0, "b": 2.0}, {"a": 3.0, "b": null}])
        );
    }

    #[test]
    fn test_corrupt_spreadsheet_is_parse_error() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("f.xlsx"), "not a workbook").unwrap();
        assert!(matches!(
            read_table(tmp.path(), "f.xlsx"),
            Err(Error::Parse { .. })
        ));
    }
}
