pub mod audio_pipeline;
pub mod config;
pub mod pipeline;
pub mod relay;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod session;
pub mod vad;

pub use config::ConfigSet;
pub use relay::{RelayEvent, RelayService};
