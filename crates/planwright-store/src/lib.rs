pub mod database;
pub mod documents;
pub mod error;
pub mod packages;
pub mod row_helpers;
pub mod schema;
pub mod session_files;
pub mod sessions;

pub use database::Database;
pub use documents::{ArtifactDescriptor, ArtifactMetadata, DocumentStore, SessionDocument, StoredArtifact};
pub use error::StoreError;
pub use packages::{PackageRecord, PackageRepo};
pub use session_files::FileSessionRepo;
pub use sessions::{SessionRepository, SqliteSessionRepo};
