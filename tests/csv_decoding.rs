use chrono::{TimeZone, Utc};

use rust_data_import::ingestion::csv::{CsvDecoder, infer_value};
use rust_data_import::ingestion::{DecodeOptions, DetectedFormat, RawSource, RecordStream, open_decoder};
use rust_data_import::types::{DataType, Field, Schema, Value};

fn people_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("name", DataType::Utf8),
        Field::new("score", DataType::Float64),
        Field::new("active", DataType::Bool),
        Field::new("joined", DataType::Date),
    ])
}

#[test]
fn csv_fixture_decodes_with_inferred_types() {
    let source = RawSource::from_path("tests/fixtures/people.csv").unwrap();
    let mut stream = open_decoder(DetectedFormat::Csv, source, &DecodeOptions::default()).unwrap();
    assert_eq!(stream.schema(), Some(&people_schema()));
    let schema = stream.schema().unwrap();
    assert_eq!(
        schema.field_names().collect::<Vec<_>>(),
        ["id", "name", "score", "active", "joined"]
    );
    assert_eq!(schema.index_of("score"), Some(2));
    assert_eq!(schema.index_of("missing"), None);

    let ada = stream.next().unwrap().unwrap().record;
    assert_eq!(ada.get("id"), Some(&Value::Int(1)));
    assert_eq!(ada.get("name"), Some(&Value::String("Ada".to_string())));
    assert_eq!(ada.get("score"), Some(&Value::Float(98.5)));
    assert_eq!(ada.get("active"), Some(&Value::Bool(true)));
    assert_eq!(
        ada.get("joined"),
        Some(&Value::Date(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()))
    );

    let grace = stream.next().unwrap().unwrap().record;
    assert_eq!(grace.get("score"), Some(&Value::Float(87.25)));
    assert!(stream.next().is_none());
}

#[test]
fn delimiter_is_detected_from_content_not_extension() {
    let source = RawSource::from_bytes("export.csv", b"\xEF\xBB\xBFid;name\n1;Ada\n2;Grace\n".to_vec());
    let decoder = CsvDecoder::from_source(source, 100).unwrap();
    assert_eq!(decoder.headers(), ["id", "name"]);

    let names: Vec<_> = decoder
        .map(|r| r.unwrap().record.get("name").cloned())
        .collect();
    assert_eq!(
        names,
        vec![
            Some(Value::String("Ada".to_string())),
            Some(Value::String("Grace".to_string()))
        ]
    );
}

#[test]
fn quoted_cells_keep_embedded_delimiters_and_empty_cells_are_null() {
    let input = "id,note,extra\n1,\"a, b\",\n";
    let mut decoder = CsvDecoder::with_delimiter(input.as_bytes(), b',', 100).unwrap();
    let record = decoder.next().unwrap().unwrap().record;
    assert_eq!(record.get("note"), Some(&Value::String("a, b".to_string())));
    assert_eq!(record.get("extra"), Some(&Value::Null));
}

#[test]
fn column_count_mismatch_is_a_recoverable_row_error() {
    let input = "id,name\n1,Ada\n2,Grace,extra\n3,Linus\n";
    let items: Vec<_> = CsvDecoder::with_delimiter(input.as_bytes(), b',', 100)
        .unwrap()
        .collect();
    assert_eq!(items.len(), 3);
    let err = items[1].as_ref().unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(err.location(), "row 3");
    assert!(items[2].is_ok());
}

#[test]
fn sample_size_bounds_schema_inference() {
    let input = "v\n1\n2\nhello\n";
    let column_type = |decoder: &CsvDecoder<&[u8]>| {
        let schema = decoder.schema().unwrap();
        schema.fields[schema.index_of("v").unwrap()].data_type
    };
    let narrow = CsvDecoder::with_delimiter(input.as_bytes(), b',', 2).unwrap();
    assert_eq!(column_type(&narrow), DataType::Int64);

    let wide = CsvDecoder::with_delimiter(input.as_bytes(), b',', 100).unwrap();
    assert_eq!(column_type(&wide), DataType::Utf8);
}

#[test]
fn cell_inference_covers_iso_dates() {
    assert_eq!(
        infer_value("2024-03-01T10:30:00"),
        Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap())
    );
    assert_eq!(
        infer_value("2024-03-01T10:30:00+02:00"),
        Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
    );
    assert_eq!(infer_value("-17"), Value::Int(-17));
    assert_eq!(infer_value("1e3"), Value::Float(1000.0));
    assert_eq!(infer_value("2024-13-45"), Value::String("2024-13-45".to_string()));
}

#[test]
fn header_only_input_yields_no_records() {
    let decoder = CsvDecoder::with_delimiter(&b"id,name\n"[..], b',', 100).unwrap();
    assert_eq!(decoder.count(), 0);
}
