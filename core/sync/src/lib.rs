//! nubz sync engine
//!
//! Exchanges data with the museum's remote service over an unreliable
//! network:
//! - Session tasks retrying the connection and the session with a linear backoff
//! - Report upload, map download and exhibit download bodies
//! - An engine running those tasks in the background
//! - On-demand and periodic scheduling

pub mod download;
pub mod engine;
pub mod remote;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod task;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;

pub use download::{translate_exhibits, translate_maps, DownloadExhibits, DownloadMap};
pub use engine::{SyncConfig, SyncEngine};
pub use remote::{
    Connector, MapImage, NewExhibitsRequest, NewExhibitsResponse, NewMapImagesRequest,
    NewMapImagesResponse, RawExhibit, RawFrame, RawReport, RawReportEvent, RemoteSession, Size,
    ZoomLevel,
};
pub use retry::{Backoff, RetryConfig, Sleeper, TokioSleeper};
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
pub use session::{SessionBody, SessionTask};
pub use task::{
    ChannelCompletion, Completion, FailureReason, FnCompletion, Task, TaskOutcome,
};
pub use upload::UploadReports;
