// Adapters layer: concrete YardStore implementations.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileYardStore;
pub use memory::{InMemoryYardStore, YardSnapshot};
