pub mod in_memory_queue;
pub mod observability;
pub mod queue_consumer;

pub use in_memory_queue::WorkQueue;
pub use observability::{JobTracer, MetricsCollector, StructuredLogger};
pub use queue_consumer::{ConsumerStats, WorkQueueConsumer};
