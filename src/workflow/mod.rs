//! Workflow transition services
//!
//! The orchestrators for the loan and site pipelines. Every transition
//! validates its preconditions before mutating, runs its row writes in one
//! transaction, and performs blob cleanup only after commit.

pub mod diff;
pub mod loan;
pub mod site;

pub use loan::LoanWorkflow;
pub use site::SiteWorkflow;

use tracing::warn;

use crate::blob_store::BlobStore;

/// Best-effort blob cleanup, run after the owning transaction commits.
/// Failures are logged and ignored; deleting an already-missing path is a
/// successful no-op at the store level.
pub(crate) async fn cleanup_blobs<I, S>(blob: &dyn BlobStore, paths: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for path in paths {
        let path = path.as_ref();
        if let Err(err) = blob.delete(path).await {
            warn!("Blob cleanup failed for '{}': {}", path, err);
        }
    }
}
