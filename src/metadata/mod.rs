//! Human-authored annotations and their reconciliation with the live schema.

pub mod comment;
pub mod enrich;
pub mod reconcile;
pub mod store;

pub use comment::{parse_comment, ParsedComment};
pub use enrich::{EnrichedColumn, EnrichedTable, Enricher};
pub use reconcile::{ColumnChanges, GenerateOutcome, MetadataDiff, Reconciler, UpdateStats};
pub use store::{BackupStatus, MetadataFile};
