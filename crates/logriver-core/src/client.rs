//! [`LogClient`]: entry point tying configuration, provisioning and the
//! collaborators together for one log stream.

use std::sync::Arc;

use crate::batch::{BatchKind, BatchLogger};
use crate::collaborator::{IndexClient, Transport};
use crate::config::Config;
use crate::deferred::Deferred;
use crate::emitter::{Emitter, Logger};
use crate::error::Result;
use crate::provision::provision;
use crate::query::Query;
use crate::types::LogName;

pub struct LogClient {
    config: Config,
    log_name: LogName,
    transport: Arc<dyn Transport>,
    index: Arc<dyn IndexClient>,
}

impl LogClient {
    /// Validate `log_name`, provision its index and broker topology, and
    /// return a client for it.
    pub async fn connect(
        config: Config,
        log_name: &str,
        transport: Arc<dyn Transport>,
        index: Arc<dyn IndexClient>,
    ) -> Result<Self> {
        let log_name = LogName::new(log_name)?;
        provision(&config, &log_name, transport.as_ref(), index.as_ref()).await?;
        Ok(Self {
            config,
            log_name,
            transport,
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_name(&self) -> &LogName {
        &self.log_name
    }

    pub fn emitter(&self) -> Emitter {
        Emitter::new(Arc::clone(&self.transport), &self.config.index, &self.config.emitter)
    }

    /// Unbuffered logger: one envelope per call.
    pub fn logger(&self) -> Logger {
        Logger::new(self.log_name.clone(), self.emitter())
    }

    pub fn batch(&self, kind: BatchKind) -> BatchLogger {
        BatchLogger::new(self.log_name.clone(), self.emitter(), kind)
    }

    /// A batch logger wrapped for deferred calls. The logger itself is
    /// reachable through [`Deferred::target`].
    pub fn deferred(&self, kind: BatchKind) -> Deferred {
        Deferred::new(self.batch(kind).shared())
    }

    /// Search handle whose timestamp bounds follow the emitter's
    /// `embed_timestamp` setting.
    pub fn query(&self) -> Query {
        let query = Query::new(
            Arc::clone(&self.index),
            self.config.index.index_name.clone(),
            self.log_name.clone(),
        );
        if self.config.emitter.embed_timestamp {
            query
        } else {
            query.with_auto_timestamp()
        }
    }
}
