use std::io::Read;

use rust_data_import::ingestion::{
    DetectedFormat, RawSource, SNIFF_PREFIX_LEN, detect_format, detect_format_bytes,
};

mod common;

fn sniff(bytes: &[u8]) -> DetectedFormat {
    detect_format(&mut RawSource::from_bytes("input", bytes.to_vec())).unwrap()
}

/// A single object of exactly `len` bytes, on one line.
fn single_object(len: usize) -> Vec<u8> {
    let head = br#"{"_id":1,"pad":""#;
    let tail = br#""}"#;
    let mut out = head.to_vec();
    out.resize(len - tail.len(), b'x');
    out.extend_from_slice(tail);
    assert_eq!(out.len(), len);
    out
}

#[test]
fn detection_is_deterministic_and_rewinds_the_source() {
    let bytes = std::fs::read("tests/fixtures/people.ndjson").unwrap();
    let mut source = RawSource::from_path("tests/fixtures/people.ndjson").unwrap();

    let first = detect_format(&mut source).unwrap();
    let second = detect_format(&mut source).unwrap();
    assert_eq!(first, DetectedFormat::Ndjson);
    assert_eq!(first, second);

    let mut rest = Vec::new();
    source.into_reader().read_to_end(&mut rest).unwrap();
    assert_eq!(rest, bytes);
}

#[test]
fn fixtures_classify_by_content() {
    for (path, expected) in [
        ("tests/fixtures/people.csv", DetectedFormat::Csv),
        ("tests/fixtures/people.json", DetectedFormat::JsonArray),
        ("tests/fixtures/people.ndjson", DetectedFormat::Ndjson),
    ] {
        let mut source = RawSource::from_path(path).unwrap();
        assert_eq!(detect_format(&mut source).unwrap(), expected, "{path}");
    }
}

#[test]
fn zip_signature_wins_regardless_of_trailing_bytes() {
    assert_eq!(detect_format_bytes(b"PK\x03\x04", true), DetectedFormat::Zip);
    assert_eq!(detect_format_bytes(b"PK\x03\x04{\"a\":1}\n{\"a\":2}\n", true), DetectedFormat::Zip);
    assert_eq!(sniff(&common::zip_bytes(&[("db/c.json", b"[]")])), DetectedFormat::Zip);
}

#[test]
fn minimal_single_object_is_json_array() {
    assert_eq!(sniff(br#"{"name":"test"}"#), DetectedFormat::JsonArray);
    assert_eq!(sniff(b"\n  {\"name\":\"test\"}\n\n"), DetectedFormat::JsonArray);
}

#[test]
fn pretty_printed_single_object_is_json_array() {
    let doc = b"{\n  \"name\": \"test\",\n  \"tags\": [\n    {\"a\": 1},\n    {\"a\": 2}\n  ]\n}\n";
    assert_eq!(sniff(doc), DetectedFormat::JsonArray);
}

#[test]
fn newline_separated_objects_are_ndjson() {
    assert_eq!(sniff(b"{\"a\":1}\n{\"a\":2}\n"), DetectedFormat::Ndjson);
    assert_eq!(sniff(b"{\"a\":1}\n\n\n{\"a\":2}"), DetectedFormat::Ndjson);
    assert_eq!(sniff(b"{\"a\":1}\r\n{\"a\":2}\r\n"), DetectedFormat::Ndjson);
}

#[test]
fn delimited_text_is_csv() {
    assert_eq!(sniff(b"id,name\n1,Ada\n"), DetectedFormat::Csv);
    assert_eq!(sniff(b"id\tname\n1\tAda\n"), DetectedFormat::Csv);
    assert_eq!(sniff(b"id;name;score\n1;Ada;98,5\n"), DetectedFormat::Csv);
    assert_eq!(sniff(b"\xEF\xBB\xBFid,name\n1,Ada\n"), DetectedFormat::Csv);
}

#[test]
fn structureless_and_empty_content_is_unknown() {
    assert_eq!(sniff(b""), DetectedFormat::Unknown);
    assert_eq!(sniff(b"   \n\t\n"), DetectedFormat::Unknown);
    assert_eq!(sniff(b"just some words\nand another line\n"), DetectedFormat::Unknown);
    assert_eq!(sniff(b"\x00\x01\x02\x03binary"), DetectedFormat::Unknown);
    assert_eq!(sniff(b"{not json at all"), DetectedFormat::Unknown);
}

#[test]
fn single_object_filling_the_prefix_exactly_is_json_array() {
    let doc = single_object(SNIFF_PREFIX_LEN);
    assert_eq!(sniff(&doc), DetectedFormat::JsonArray);
}

#[test]
fn single_object_one_byte_past_the_prefix_is_json_array() {
    let doc = single_object(SNIFF_PREFIX_LEN + 1);
    assert_eq!(sniff(&doc), DetectedFormat::JsonArray);
}

#[test]
fn single_object_far_past_the_prefix_is_json_array() {
    let doc = single_object(SNIFF_PREFIX_LEN * 16);
    assert_eq!(sniff(&doc), DetectedFormat::JsonArray);
}

#[test]
fn truncated_object_in_a_complete_source_is_unknown() {
    let mut doc = single_object(SNIFF_PREFIX_LEN - 1);
    doc.pop();
    assert_eq!(sniff(&doc), DetectedFormat::Unknown);
}

#[test]
fn ndjson_with_records_longer_than_the_prefix_is_ndjson() {
    let mut doc = single_object(9_000);
    doc.push(b'\n');
    doc.extend_from_slice(&single_object(9_000));
    doc.push(b'\n');
    let mut source = RawSource::from_bytes("big.ndjson", doc.clone());

    assert_eq!(detect_format(&mut source).unwrap(), DetectedFormat::Ndjson);
    let mut rest = Vec::new();
    source.into_reader().read_to_end(&mut rest).unwrap();
    assert_eq!(rest, doc);
}

#[test]
fn long_object_followed_by_whitespace_only_is_json_array() {
    let mut doc = b"\xEF\xBB\xBF\n".to_vec();
    doc.extend_from_slice(&single_object(SNIFF_PREFIX_LEN * 2));
    doc.extend_from_slice(b"\n\n  \n");
    assert_eq!(sniff(&doc), DetectedFormat::JsonArray);
}

#[test]
fn long_object_followed_by_anything_else_is_unknown() {
    let mut same_line = single_object(SNIFF_PREFIX_LEN + 100);
    same_line.extend_from_slice(br#" {"_id":2}"#);
    assert_eq!(sniff(&same_line), DetectedFormat::Unknown);

    let mut trailing = single_object(SNIFF_PREFIX_LEN + 100);
    trailing.extend_from_slice(b"\nid,name\n");
    assert_eq!(sniff(&trailing), DetectedFormat::Unknown);
}

#[test]
fn long_object_that_never_closes_is_unknown() {
    let mut doc = single_object(SNIFF_PREFIX_LEN * 2);
    doc.truncate(doc.len() - 2);
    assert_eq!(sniff(&doc), DetectedFormat::Unknown);
}
