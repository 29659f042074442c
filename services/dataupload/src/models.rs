use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Field name -> value mapping produced for one parsed row or object
pub type RecordData = serde_json::Map<String, serde_json::Value>;

/// One submitted file
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileUpload {
    /// Store-assigned ID
    pub id: i64,
    /// Reference returned by the raw file storage
    pub file: String,
    /// When the upload was recorded
    pub uploaded_at: DateTime<Utc>,
}

/// One parsed row/object belonging to a [`FileUpload`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DataRecord {
    /// Store-assigned ID
    pub id: i64,
    /// Owning upload
    pub file_upload_id: i64,
    /// Parsed fields
    pub data: serde_json::Value,
    /// Source format tag ("csv" or "json")
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub record_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_with_type_key() {
        let record = DataRecord {
            id: 7,
            file_upload_id: 3,
            data: json!({"col1": "val1"}),
            record_type: Some("csv".to_string()),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "file_upload_id": 3,
                "data": {"col1": "val1"},
                "type": "csv"
            })
        );
    }

    #[test]
    fn test_untagged_record_serializes_null_type() {
        let record = DataRecord {
            id: 1,
            file_upload_id: 1,
            data: json!({}),
            record_type: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert!(value["type"].is_null());
    }
}
