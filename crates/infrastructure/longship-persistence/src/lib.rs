mod api;
mod codec;
mod error;
mod maintenance;
mod paths;
mod store;

pub use api::*;
pub use error::*;
pub use paths::normalize_rel_path;
pub use store::CacheStore;
