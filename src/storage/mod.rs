//! Local store for the account mirror.
//!
//! - `schema`: table layout and versioning
//! - `store`: the `KitStore` handle with its atomic replace/append writes
//! - `query`: the tag index query engine used for filtered history pages

/// SQL schema and migrations
pub mod schema;
/// Store handle and row codecs
pub mod store;
/// Filtered, cursor-paginated history reads
pub mod query;

pub use query::{DEFAULT_QUERY_LIMIT, OperationQuery};
pub use store::{AppendOutcome, KitStore, OperationBatch, StorageError};
