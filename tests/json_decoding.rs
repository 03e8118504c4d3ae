use std::fs::File;
use std::io::BufReader;

use chrono::{TimeZone, Utc};

use rust_data_import::DecodeError;
use rust_data_import::ingestion::json::{JsonArrayDecoder, NdjsonDecoder};
use rust_data_import::ingestion::{DecodeOptions, DetectedFormat, RawSource, RecordStream, open_decoder};
use rust_data_import::types::{ObjectId, Value};

#[test]
fn json_array_fixture_decodes_extended_types() {
    let file = File::open("tests/fixtures/people.json").unwrap();
    let decoder = JsonArrayDecoder::from_reader(file).unwrap();
    assert_eq!(decoder.total_estimate(), Some(2));

    let records: Vec<_> = decoder.map(|r| r.unwrap().record).collect();
    assert_eq!(records.len(), 2);

    let ada = &records[0];
    assert_eq!(
        ada.get("_id"),
        Some(&Value::ObjectId(ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap()))
    );
    assert_eq!(ada.get("name"), Some(&Value::String("Ada".to_string())));
    assert_eq!(ada.get("score"), Some(&Value::Float(98.5)));
    assert_eq!(ada.get("active"), Some(&Value::Bool(true)));
    assert_eq!(
        ada.get("joined"),
        Some(&Value::Date(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()))
    );
    assert_eq!(ada.get("visits"), Some(&Value::Int(9_007_199_254_740_993)));

    let grace = &records[1];
    assert_eq!(
        grace.get("joined"),
        Some(&Value::Date(Utc.with_ymd_and_hms(2023, 11, 2, 0, 0, 0).unwrap()))
    );
    assert_eq!(grace.get("visits"), Some(&Value::Int(3)));
}

#[test]
fn json_array_field_order_is_preserved() {
    let decoder = JsonArrayDecoder::from_slice(br#"[{"z":1,"a":2,"m":3}]"#).unwrap();
    let record = decoder.map(|r| r.unwrap().record).next().unwrap();
    let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["z", "a", "m"]);
}

#[test]
fn malformed_array_element_fails_before_any_record() {
    for input in [
        &br#"[{"a":1}, 5]"#[..],
        br#"[{"a":1}, {"b":{"$oid":"not-hex"}}]"#,
        br#"[{"a":1}, {"b":2}"#,
        br#""just a string""#,
    ] {
        let err = JsonArrayDecoder::from_slice(input).unwrap_err();
        assert!(!err.is_recoverable(), "{err}");
        assert!(matches!(err, DecodeError::Document { .. }));
    }
}

#[test]
fn ndjson_fixture_skips_blank_lines_and_tolerates_crlf() {
    let file = File::open("tests/fixtures/people.ndjson").unwrap();
    let records: Vec<_> = NdjsonDecoder::new(BufReader::new(file))
        .map(|r| r.unwrap().record)
        .collect();

    let ids: Vec<_> = records.iter().map(|r| r.get("_id").cloned()).collect();
    assert_eq!(ids, vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]);
    assert_eq!(records[1].get("active"), Some(&Value::Bool(false)));
}

#[test]
fn ndjson_bad_lines_are_recoverable_and_name_the_line() {
    let input = "\u{feff}{\"a\":1}\nnot json\n[1,2]\n\n{\"a\":{\"$date\":\"yesterday\"}}\n{\"a\":2}\n";
    let items: Vec<_> = NdjsonDecoder::new(input.as_bytes()).collect();
    assert_eq!(items.len(), 5);

    assert_eq!(items[0].as_ref().unwrap().record.get("a"), Some(&Value::Int(1)));
    let locations: Vec<String> = items[1..4]
        .iter()
        .map(|item| {
            let err = item.as_ref().unwrap_err();
            assert!(err.is_recoverable());
            err.location()
        })
        .collect();
    assert_eq!(locations, vec!["line 2", "line 3", "line 5"]);
    assert_eq!(items[4].as_ref().unwrap().record.get("a"), Some(&Value::Int(2)));
}

#[test]
fn open_decoder_dispatches_on_format() {
    let source = RawSource::from_path("tests/fixtures/people.ndjson").unwrap();
    let stream = open_decoder(DetectedFormat::Ndjson, source, &DecodeOptions::default()).unwrap();
    assert_eq!(stream.count(), 3);

    let source = RawSource::from_bytes("one.json", br#"{"name":"test"}"#.to_vec());
    let mut stream = open_decoder(DetectedFormat::JsonArray, source, &DecodeOptions::default()).unwrap();
    assert_eq!(stream.total_estimate(), Some(1));
    let record = stream.next().unwrap().unwrap().record;
    assert_eq!(record.get("name"), Some(&Value::String("test".to_string())));
    assert!(stream.next().is_none());
}

#[test]
fn open_decoder_refuses_unknown() {
    let source = RawSource::from_bytes("x", b"hello".to_vec());
    let err = open_decoder(DetectedFormat::Unknown, source, &DecodeOptions::default()).err().unwrap();
    assert!(matches!(err, rust_data_import::ImportError::Classification { .. }));
}
