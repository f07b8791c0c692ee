//! Conflict detection and resolution

mod detector;
mod resolver;

pub use detector::{classify, ConflictDetector};
pub use resolver::ConflictResolver;
