//! Data Upload Service
//!
//! Accepts CSV and JSON files over HTTP, parses them into flat records and
//! indexes those records in PostgreSQL next to the upload they came from.
//!
//! ## Architecture
//!
//! ```text
//!  POST /data/upload/         ┌──────────────┐     ┌──────────────┐
//! ───────────────────────────▶│ Upload       │────▶│ Parser       │
//!                             │ Service      │     │ Selector     │
//!                             └──────────────┘     └──────────────┘
//!                                │        │               │
//!                                ▼        │               ▼
//!                       ┌──────────────┐  │        ┌──────────────┐
//!                       │ File Storage │  │        │ CSV / JSON   │
//!                       │ (disk / S3)  │  │        │ Parser       │
//!                       └──────────────┘  │        └──────────────┘
//!                                         ▼
//!  GET /data/query/?type=     ┌──────────────┐
//! ───────────────────────────▶│ Record Store │  file_uploads
//!                             │ (PostgreSQL) │  data_records
//!                             └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod file_storage;
pub mod models;
pub mod parser;
pub mod query;
pub mod store;
pub mod upload;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use error::{ParseError, UploadError};
pub use file_storage::{FileStorage, LocalFileStorage, S3FileStorage};
pub use models::{DataRecord, FileUpload, RecordData};
pub use parser::{select_parser, CsvFileParser, FileParser, FileType, JsonFileParser};
pub use query::query_records;
pub use store::{PgRecordStore, RecordStore};
pub use upload::{UploadOutcome, UploadService, UploadedFile};
