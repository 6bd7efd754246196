pub mod cron_job;
pub mod message;
pub mod scope;

pub use cron_job::*;
pub use message::*;
pub use scope::*;
