pub mod projection;
pub mod projector;
pub mod snapshot;
pub mod types;

pub use projection::*;
pub use projector::*;
pub use snapshot::*;
pub use types::*;
