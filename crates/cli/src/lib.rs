// Process wiring (logging, shutdown)
pub mod process;

// App state (configuration, master seed, paths)
pub mod state;

pub use state::{AppConfig, AppState, ProbeConfig, StateError};
