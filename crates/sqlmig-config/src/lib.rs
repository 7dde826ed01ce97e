pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{AppConfig, DEFAULT_BATCH_TIMEOUT_SECS, DEFAULT_LEDGER_TABLE};
