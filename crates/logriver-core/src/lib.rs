//! logriver-core: buffered logging into a broker-fed search index.
//!
//! Application code logs through a [`Logger`] (one envelope per call) or a
//! [`BatchLogger`] (collect, then flush as one envelope). Envelopes go to a
//! message broker; a river registered at provisioning time relays them into
//! the search index, where [`Query`] reads them back.
//!
//! # Architecture
//!
//! ```text
//! BatchLogger ──► Emitter ──► Transport ══► broker ══► river ══► index
//!     ▲                                                            │
//! Deferred                                      Query ◄── IndexClient
//! ```
//!
//! The broker and index are reached only through the [`Transport`] and
//! [`IndexClient`] traits; implementations live in `logriver-backends`.

pub mod batch;
pub mod client;
pub mod collaborator;
pub mod config;
pub mod deferred;
pub mod emitter;
pub mod error;
pub mod provision;
pub mod query;
pub mod types;

#[cfg(test)]
mod testing;

pub use batch::{BatchBuffer, BatchKind, BatchLogger, SharedBatchLogger};
pub use client::LogClient;
pub use collaborator::{ExchangeKind, ExchangeSpec, IndexClient, QueueSpec, RiverSpec, Transport};
pub use config::Config;
pub use deferred::{Deferred, DeferredAction};
pub use emitter::{Emitter, Envelope, Logger};
pub use error::{DeliveryError, IndexError, LogError, Result, TransportError};
pub use query::{Filter, Hit, Query, RangeOp, SearchRequest, SearchResponse, TimeBound};
pub use types::{LogName, LogRecord, Severity};
