//! Format parsers and extension-based parser selection.
//!
//! Both formats normalize to the same shape: an ordered list of flat
//! field-name -> value maps, one per CSV row or JSON object.

use crate::error::{ParseError, UploadError};
use crate::models::RecordData;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Source format of an uploaded file, stored as the record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Json,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Json => "json",
        }
    }

    pub fn parser(&self) -> &'static dyn FileParser {
        match self {
            FileType::Csv => &CsvFileParser,
            FileType::Json => &JsonFileParser,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns the raw bytes of one file into records
pub trait FileParser: Send + Sync {
    fn parse(&self, contents: &[u8]) -> Result<Vec<RecordData>, ParseError>;
}

/// Header-keyed CSV rows.
///
/// Short rows are padded with `null` for the missing columns. Rows with more
/// fields than the header fail the whole file.
pub struct CsvFileParser;

impl FileParser for CsvFileParser {
    fn parse(&self, contents: &[u8]) -> Result<Vec<RecordData>, ParseError> {
        let text = std::str::from_utf8(contents)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers().map_err(csv_error)?.clone();
        let mut records = Vec::new();

        for row in reader.records() {
            let row = row.map_err(csv_error)?;

            if row.len() > headers.len() {
                return Err(ParseError::Csv {
                    line: row.position().map(|p| p.line()).unwrap_or_default(),
                    message: format!(
                        "found {} fields, header has {}",
                        row.len(),
                        headers.len()
                    ),
                });
            }

            let record: RecordData = headers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row
                        .get(i)
                        .map(|v| Value::String(v.to_string()))
                        .unwrap_or(Value::Null);
                    (name.to_string(), value)
                })
                .collect();

            records.push(record);
        }

        Ok(records)
    }
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or_default();
    ParseError::Csv {
        line,
        message: err.to_string(),
    }
}

/// A single JSON object, or an array of objects.
pub struct JsonFileParser;

impl FileParser for JsonFileParser {
    fn parse(&self, contents: &[u8]) -> Result<Vec<RecordData>, ParseError> {
        match serde_json::from_slice::<Value>(contents)? {
            Value::Object(map) => Ok(vec![map]),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(ParseError::Shape(format!(
                        "array element {index} is {}, expected an object",
                        json_kind(&other)
                    ))),
                })
                .collect(),
            other => Err(ParseError::Shape(format!(
                "top-level value is {}, expected an object or an array of objects",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Pick the parser for a file by its extension.
///
/// Matching is case-sensitive: `report.CSV` is not a CSV file here.
pub fn select_parser(file_name: &str) -> Result<(&'static dyn FileParser, FileType), UploadError> {
    let file_type = if file_name.ends_with(".csv") {
        FileType::Csv
    } else if file_name.ends_with(".json") {
        FileType::Json
    } else {
        return Err(UploadError::UnsupportedFileType(file_name.to_string()));
    };

    Ok((file_type.parser(), file_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn as_values(records: Vec<RecordData>) -> Vec<Value> {
        records.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn test_select_parser_by_extension() {
        let (_, file_type) = select_parser("test_file.csv").unwrap();
        assert_eq!(file_type, FileType::Csv);
        assert_eq!(file_type.as_str(), "csv");

        let (_, file_type) = select_parser("nested.dir/test_file.json").unwrap();
        assert_eq!(file_type, FileType::Json);
        assert_eq!(file_type.to_string(), "json");
    }

    #[test]
    fn test_select_parser_rejects_other_extensions() {
        for name in ["test_file.txt", "data.xlsx", "csv", "json", "archive.csv.gz", ""] {
            let err = select_parser(name).err().unwrap();
            assert!(
                matches!(err, UploadError::UnsupportedFileType(_)),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_select_parser_is_case_sensitive() {
        assert!(select_parser("DATA.CSV").is_err());
        assert!(select_parser("data.Json").is_err());
    }

    #[test]
    fn test_selected_parser_matches_tag() {
        let (parser, _) = select_parser("rows.csv").unwrap();
        let records = parser.parse(b"a,b\n1,2").unwrap();
        assert_eq!(as_values(records), vec![json!({"a": "1", "b": "2"})]);

        let (parser, _) = select_parser("rows.json").unwrap();
        let records = parser.parse(br#"{"a": 1}"#).unwrap();
        assert_eq!(as_values(records), vec![json!({"a": 1})]);
    }

    #[test]
    fn test_csv_single_row() {
        let records = CsvFileParser.parse(b"col1,col2\nval1,val2").unwrap();
        assert_eq!(as_values(records), vec![json!({"col1": "val1", "col2": "val2"})]);
    }

    #[test]
    fn test_csv_keeps_row_order_and_skips_blank_lines() {
        let records = CsvFileParser
            .parse(b"id,name\n1,alpha\n\n2,beta\r\n3,gamma\n")
            .unwrap();

        let names: Vec<_> = records.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("alpha"), json!("beta"), json!("gamma")]);
    }

    #[test]
    fn test_csv_quoted_fields() {
        let records = CsvFileParser
            .parse(b"name,notes\n\"Smith, J\",\"line one\nline two\"")
            .unwrap();

        assert_eq!(
            as_values(records),
            vec![json!({"name": "Smith, J", "notes": "line one\nline two"})]
        );
    }

    #[test]
    fn test_csv_short_row_pads_with_null() {
        let records = CsvFileParser.parse(b"a,b,c\n1,2").unwrap();
        assert_eq!(as_values(records), vec![json!({"a": "1", "b": "2", "c": null})]);
    }

    #[test]
    fn test_csv_long_row_is_rejected() {
        let err = CsvFileParser.parse(b"a,b\n1,2\n3,4,5").unwrap_err();
        match err {
            ParseError::Csv { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("3 fields"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_csv_header_only_and_empty_input() {
        assert!(CsvFileParser.parse(b"a,b\n").unwrap().is_empty());
        assert!(CsvFileParser.parse(b"").unwrap().is_empty());
    }

    #[test]
    fn test_csv_invalid_utf8() {
        let err = CsvFileParser.parse(b"a,b\n\xff\xfe,1").unwrap_err();
        assert!(matches!(err, ParseError::Encoding(_)));
    }

    #[test]
    fn test_csv_field_names_match_header() {
        let records = CsvFileParser
            .parse(b"when,who,what\n2024-01-01,ann,login\n2024-01-02,bob\n")
            .unwrap();

        let header: BTreeSet<_> = ["when", "who", "what"].into_iter().map(String::from).collect();
        for record in &records {
            let keys: BTreeSet<_> = record.keys().cloned().collect();
            assert_eq!(keys, header);
        }
    }

    #[test]
    fn test_json_single_object() {
        let records = JsonFileParser.parse(br#"{"key": "value"}"#).unwrap();
        assert_eq!(as_values(records), vec![json!({"key": "value"})]);
    }

    #[test]
    fn test_json_array_of_objects() {
        let records = JsonFileParser
            .parse(br#"[{"a": 1, "nested": {"x": [1, 2]}}, {"b": null}]"#)
            .unwrap();

        assert_eq!(
            as_values(records),
            vec![json!({"a": 1, "nested": {"x": [1, 2]}}), json!({"b": null})]
        );
        assert!(JsonFileParser.parse(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_json_object_keys_preserved() {
        let records = JsonFileParser
            .parse(br#"{"id": 1, "tags": ["x"], "owner": {"name": "ann"}}"#)
            .unwrap();

        let keys: BTreeSet<_> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["id", "tags", "owner"]));
    }

    #[test]
    fn test_json_rejects_non_object_elements() {
        let err = JsonFileParser.parse(br#"[{"a": 1}, 2]"#).unwrap_err();
        match err {
            ParseError::Shape(message) => assert!(message.contains("element 1"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_rejects_scalars() {
        for doc in [&b"\"text\""[..], &b"42"[..], &b"true"[..], &b"null"[..]] {
            assert!(matches!(JsonFileParser.parse(doc), Err(ParseError::Shape(_))));
        }
    }

    #[test]
    fn test_json_malformed() {
        let err = JsonFileParser.parse(b"{\"key\": ").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
        assert!(matches!(JsonFileParser.parse(b""), Err(ParseError::Json(_))));
    }
}
