pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};
pub use config::{StoreKind, YardConfig, YardSettings};

pub use adapters::{InMemoryYardStore, JsonFileYardStore};
pub use crate::core::{layout::BlockLayout, yard::YardService};
pub use utils::error::{Result, YardError};
