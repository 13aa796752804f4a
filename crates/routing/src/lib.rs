pub mod animator;
pub mod backend;
pub mod markers;
pub mod orchestrator;

pub use animator::*;
pub use backend::*;
pub use markers::*;
pub use orchestrator::*;
