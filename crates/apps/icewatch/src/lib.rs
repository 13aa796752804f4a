pub mod config;
pub mod driver;
pub mod session;

pub use config::ViewerConfig;
pub use driver::{run_session, Backends, Flow};
pub use session::*;
