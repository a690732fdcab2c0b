//! # clinic-blob: remote storage for record attachments
//!
//! `clinic-blob` puts a small, failure-aware layer over whatever remote
//! object store holds clinic documents. The store has no transactional
//! relationship with patient records; this crate only makes each remote
//! call bounded and reportable so the record layer can reason about it.
//!
//! ```text
//! ┌──────────────────┐
//! │  Record ledger   │  ← decides what to upload / delete
//! ├──────────────────┤
//! │   BlobAdapter    │  ← timeouts, fan-out, NotFound-as-success
//! ├──────────────────┤
//! │    BlobStore     │  ← storage primitives (memory, S3)
//! └──────────────────┘
//! ```
//!
//! ```rust
//! use clinic_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = MemoryBlobStore::new();
//! let adapter = BlobAdapter::new(store.clone(), BlobConfig::default());
//!
//! let ctx = BlobCtx::new("clinic-1".to_string());
//! let put = BlobPut::new("Happy_Clinic/HN0001")
//!     .with_filename("scan.png")
//!     .with_content_type("image/png");
//!
//! let receipt = adapter.upload(&ctx, put, bytes::Bytes::from_static(b"png")).await?;
//! assert!(store.contains(&receipt.id));
//!
//! let report = adapter.batch_delete(&ctx, vec![receipt.id]).await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
mod config;
mod error;
mod memory_store;
mod receipt;
#[cfg(feature = "s3")]
mod s3_store;
pub mod store;
mod types;

pub use adapter::BlobAdapter;
pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use memory_store::{MemoryBlobStore, MemoryObject};
pub use receipt::{BlobReceipt, DeletionReport};
#[cfg(feature = "s3")]
pub use s3_store::{S3CompatibleStore, S3Config};
pub use store::{sanitize_filename, BlobKeyStrategy, BlobStore, DefaultKeyStrategy, StoreCapabilities};
pub use types::{
    BatchDeleteResult, BlobCtx, BlobId, BlobListing, BlobMetadata, BlobPut, FailedDelete, StoredBlob,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobAdapter, BlobConfig, BlobCtx, BlobError, BlobId, BlobPut, BlobReceipt, BlobResult,
        BlobStore, DeletionReport, MemoryBlobStore,
    };
}
