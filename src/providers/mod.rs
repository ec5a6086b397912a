//! Providers Module - Broker and result backend clients

pub mod broker;
pub mod memory;
pub mod redis_broker;

pub use broker::{connect, start_cleanup_task, Broker, Delivery};
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
