pub mod aimd;
pub mod cancel;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod executor;
pub mod initiation;
pub mod pipeline;
mod queue;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod throughput;
pub mod transfer;
pub mod tree;

pub use cancel::UploadController;
pub use descriptor::UploadMode;
pub use error::{ItemError, UploadError};
pub use events::{RunOutcome, RunReport, UploadEvent};
pub use pipeline::Uploader;
pub use selection::{SelectionItem, UploadSource, selection_from_path};
pub use session::UploadSession;
pub use tree::{DeltaSink, MemoryTree};
