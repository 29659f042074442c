use crate::error::UploadError;
use crate::file_storage::FileStorage;
use crate::parser::{select_parser, FileType};
use crate::store::RecordStore;
use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Declared content types accepted for upload
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["application/json", "text/csv"];

pub const SUCCESS_MESSAGE: &str = "File uploaded successfully";

/// One file as submitted by the caller
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub contents: Bytes,
}

/// What was stored for a successful upload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadOutcome {
    pub message: String,
    pub upload_id: i64,
    /// Stored file reference
    pub file: String,
    pub file_type: FileType,
    pub record_count: usize,
}

/// Validates, parses and persists uploaded files
#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn RecordStore>,
    files: Arc<dyn FileStorage>,
}

impl UploadService {
    pub fn new(store: Arc<dyn RecordStore>, files: Arc<dyn FileStorage>) -> Self {
        Self { store, files }
    }

    /// Handle one uploaded file end to end.
    ///
    /// Nothing is written unless the content type is accepted and the whole
    /// file parses. Records are then inserted one by one without a
    /// transaction, so a failing insert leaves the upload and the records
    /// before it in place.
    ///
    /// The declared content type and the file extension are checked
    /// independently; `text/csv` with a `.json` name is parsed as JSON.
    #[instrument(
        skip(self, file),
        fields(
            file_name = %file.file_name,
            content_type = %file.content_type,
            size_bytes = file.contents.len()
        )
    )]
    pub async fn handle(&self, file: UploadedFile) -> Result<UploadOutcome, UploadError> {
        if !ALLOWED_CONTENT_TYPES.contains(&file.content_type.as_str()) {
            return Err(UploadError::UnsupportedContentType(file.content_type));
        }

        let (parser, file_type) = select_parser(&file.file_name)?;
        let rows = parser.parse(&file.contents)?;

        let stored_file = self
            .files
            .save(&file.file_name, &file.contents)
            .await
            .context("Failed to store raw file")?;

        let upload = self
            .store
            .create_upload(&stored_file)
            .await
            .context("Failed to create upload")?;

        for (written, row) in rows.iter().enumerate() {
            if let Err(e) = self
                .store
                .create_record(upload.id, row, Some(file_type.as_str()))
                .await
            {
                error!(
                    upload_id = upload.id,
                    records_written = written,
                    records_total = rows.len(),
                    "Record insert failed; earlier records are kept"
                );
                return Err(e.context("Failed to create data record").into());
            }
            metrics::counter!("dataupload.records.created").increment(1);
        }

        info!(
            upload_id = upload.id,
            file = %upload.file,
            file_type = %file_type,
            record_count = rows.len(),
            "File uploaded"
        );

        Ok(UploadOutcome {
            message: SUCCESS_MESSAGE.to_string(),
            upload_id: upload.id,
            file: upload.file,
            file_type,
            record_count: rows.len(),
        })
    }
}
