pub mod activity;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod memory;
pub mod rule;
pub mod seed;
pub mod store;

pub use config::Config;
pub use entity::*;
pub use error::*;
pub use memory::MemoryStore;
pub use store::{DocumentStore, LedgerStore};
