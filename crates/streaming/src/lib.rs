pub mod backend;
pub mod cache;
pub mod controller;
pub mod date_index;
pub mod http;
pub mod request;
pub mod residency;

pub use backend::*;
pub use cache::*;
pub use controller::*;
pub use date_index::*;
pub use http::HttpBackend;
pub use request::*;
pub use residency::*;
