pub mod persistence;
pub mod ports;
pub mod recovery;
pub mod registry;
pub mod service;
pub mod watcher;

pub use persistence::*;
pub use ports::*;
pub use recovery::*;
pub use registry::*;
pub use service::*;
pub use watcher::*;
