// Library crate for bootlog: persists an in-memory boot log onto every registered
// volume through a fixed set of rotating, fixed-size files.

pub mod append;
pub mod builder;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod layout;
pub mod marker;
pub mod reader;
pub mod rotation;
pub mod source;
pub mod volume;

pub use device::{DeviceId, DeviceStatus};
pub use engine::{FlushOutcome, FlushTrigger, LogEngine};
pub use error::{LayoutError, LogError, SourceError};
pub use layout::Layout;
pub use source::{LogSource, MemoryLog, SourceCursor};
