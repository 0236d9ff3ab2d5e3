pub mod api;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod query;
pub mod state;

// Re-export main types for convenience
pub use api::{ApiClient, QueryBackend, DEFAULT_API_BASE};
pub use artifact::{PdfPreview, PreviewSlot, DOWNLOAD_FILENAME};
pub use config::Config;
pub use controller::{QueryController, RetryPolicy, RetryState};
pub use error::QueryError;
pub use query::{Category, Query, QueryPayload, QueryResult, Source, SourceKind};
pub use state::{ChatEntry, ChatLog, EntryId, EntryResult, QueryState, Snapshot};
