//! Upload session flow: flatten, batch scheduling, progress, result reporting.
//!
//! This crate holds the **orchestration** of a multi-file upload. It has
//! no UI: callers supply a [`ProgressSurface`] to show progress and a
//! [`Transport`](fileup_transfer::Transport) to reach the server.
//!
//! # Pipeline
//!
//! 1. **Flatten** - expand dropped files and folders into a flat list
//! 2. **Partition** - cut the list into fixed-size batches
//! 3. **Schedule** - run a bounded number of batches, each with a bounded
//!    number of concurrent transfers
//! 4. **Aggregate** - fold batch and byte progress into throttled snapshots
//! 5. **Report** - count outcomes, summarize, invalidate the listing cache

pub mod cache;
pub mod error;
pub mod flatten;
pub mod policy;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod surface;

pub use cache::{EtagCache, ListingCache, NoopCache};
pub use error::{ScanError, UploadError};
pub use flatten::{flatten, scan_entry};
pub use policy::UploadPolicy;
pub use progress::{ProgressAggregator, ProgressSnapshot, Throttle};
pub use report::{FailedFile, ResultReporter, UploadSessionResult, Verdict};
pub use scheduler::{Batch, BatchContext, SchedulerReport, SessionEvent, UploadScheduler, partition};
pub use session::UploadSession;
pub use source::{DirectoryReader, DropEntry, EntryKind, FileContent, FsEntry, MemoryEntry};
pub use surface::{NullSurface, ProgressSurface};
