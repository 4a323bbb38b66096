//! Configuration loading and schema.

pub mod loader;
pub mod schema;

pub use loader::{LoadResult, load, load_defaults};
pub use schema::EngineConfig;
