pub mod container;
pub mod delivery_lane;
pub mod handler_registry;
pub mod models;
pub mod traits;

pub use container::{ServiceContainer, ServiceScope};
pub use delivery_lane::{DeliveryLane, LaneTicket};
pub use handler_registry::{HandlerDescriptor, HandlerId, HandlerInstaller, HandlerRegistry, HandlerSource};
pub use models::{DispatchMode, JobContext, JobLoopState, WorkItem};
pub use traits::{
    job_fn, CronJob, DependencyScope, DependencyScopeFactory, FnJob, Message, MessageHandler,
};

pub use jobhost_errors::{JobHostError, JobHostResult};
pub use tokio_util::sync::CancellationToken;
