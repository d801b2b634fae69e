//! AMQP broker transport.
//!
//! Opens one connection and one channel in publisher-confirm mode; every
//! publish waits for the broker's ack, so a nack or a dropped channel surfaces
//! as a [`TransportError`] to the emitter.

use async_trait::async_trait;
use bytes::Bytes;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info};

use logriver_core::collaborator::{ExchangeKind, ExchangeSpec, QueueSpec, Transport};
use logriver_core::config::BrokerConfig;
use logriver_core::TransportError;

const CONTENT_TYPE: &str = "application/x-ndjson";
const PERSISTENT: u8 = 2;

pub struct AmqpTransport {
    // Kept so the connection outlives the channel.
    _connection: Connection,
    channel: Channel,
}

impl AmqpTransport {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, TransportError> {
        let connection = Connection::connect(&config.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(map_err)?;

        info!(
            host = %config.host,
            port = config.port,
            vhost = %config.virtual_host,
            "connected to broker"
        );
        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

fn map_err(e: lapin::Error) -> TransportError {
    match e {
        lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
            TransportError::Closed
        }
        other => TransportError::Rejected(other.to_string()),
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), TransportError> {
        let options = ExchangeDeclareOptions {
            durable: spec.durable,
            auto_delete: spec.auto_delete,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(&spec.name, exchange_kind(spec.kind), options, FieldTable::default())
            .await
            .map_err(map_err)?;
        debug!(exchange = %spec.name, "exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), TransportError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            auto_delete: spec.auto_delete,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&spec.name, options, FieldTable::default())
            .await
            .map_err(map_err)?;
        debug!(queue = %spec.name, "queue declared");
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(map_err)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT);

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(map_err)?;

        match confirm.await.map_err(map_err)? {
            Confirmation::Nack(_) => Err(TransportError::Rejected(format!(
                "broker nacked message for {exchange}"
            ))),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }
}
