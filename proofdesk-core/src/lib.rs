pub mod clock;
pub mod docx;
pub mod error;
pub mod export;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod openai;
pub mod prompt;
pub mod quality;
pub mod record;
pub mod review;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ReviewError, ReviewResult};
pub use export::{select_approved, ExportFormat, ExportRow, EXPORT_HEADER};
pub use generation::{GenerationRequest, TextGenerator};
pub use ingest::{IngestOptions, IngestSummary, SourceItem};
pub use openai::{OpenAIClient, OpenAIConfig, DEFAULT_MODEL};
pub use quality::QualityReport;
pub use record::{ArtNr, ProductRecord, ReviewStatus};
pub use review::{apply, LockPolicy, ReviewAction, DEFAULT_LOCK_TTL_MINUTES};
