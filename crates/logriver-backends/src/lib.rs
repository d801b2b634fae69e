//! logriver-backends: collaborator implementations for logriver.
//!
//! - [`amqp::AmqpTransport`]: AMQP 0-9-1 broker transport.
//! - [`elastic::ElasticClient`]: search index over its HTTP API.
//! - [`memory`]: in-process broker and index joined by a river, for dry
//!   runs and tests.

pub mod amqp;
pub mod elastic;
pub mod memory;

pub use amqp::AmqpTransport;
pub use elastic::ElasticClient;
pub use memory::{MemoryBroker, MemoryIndex, StoredDocument};
