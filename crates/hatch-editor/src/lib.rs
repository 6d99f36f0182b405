pub mod clipboard;
pub mod commands;
pub mod config;
pub mod error;
pub mod mutation;
pub mod persist;
pub mod session;

pub use clipboard::Clipboard;
pub use commands::CommandStack;
pub use config::EditorConfig;
pub use error::{EditorError, StoreError};
pub use mutation::{CanvasEdit, GraphMutation};
pub use persist::{ContainerRecord, ContainerStore, MemoryStore, PendingRequests, RequestId, RequestKind, RequestTicket};
pub use session::EditorSession;
