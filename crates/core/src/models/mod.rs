pub mod dispatch;
pub mod job;
pub mod work_item;

pub use dispatch::*;
pub use job::*;
pub use work_item::*;
