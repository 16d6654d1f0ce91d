//! Line reflow and comment overlay engine for reviewing a highlighted
//! source file.

pub mod annotations;
pub mod db;
pub mod drag;
pub mod error;
pub mod highlight;
pub mod http;
pub mod overlay;
pub mod reflow;
pub mod registry;
pub mod schema;
pub mod surface;
pub mod sync;
pub mod types;

pub use error::{LookupError, RemoteError, StructuralError, SyncError};
pub use surface::{ReviewSession, ReviewSurface, SurfaceEvent};
pub use sync::{CommentTransport, Fetched, Mutation, RemoteSyncClient};
