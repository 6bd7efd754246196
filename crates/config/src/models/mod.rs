pub mod app_config;
pub mod cron;
pub mod logging;
pub mod message_bus;
pub mod queue;

pub use app_config::*;
pub use cron::*;
pub use logging::*;
pub use message_bus::*;
pub use queue::*;
