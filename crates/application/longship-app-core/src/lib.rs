pub mod announcement;
mod async_runtime;
pub mod events;
pub mod orchestrator;
pub mod setup;

pub use announcement::{AnnouncementBoard, AnnouncementWatcher};
pub use events::{RunId, UpdateEvent};
pub use orchestrator::{ControllerError, RunHandle, UpdateController};
