//! RabbitMQ job queue.

use std::str::FromStr;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::mail::JobQueue;

const DEFAULT_AMQP_HOST: &str = "localhost";
const DEFAULT_AMQP_PORT: u16 = 5672;
const DEFAULT_AMQP_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";

/// Publish events on a durable RabbitMQ queue.
pub struct RabbitMqQueue {
    queue: String,
    conn: Connection,
}

/// Build the AMQP URI described by the `mail` section.
fn amqp_uri(config: &Mail) -> Result<AMQPUri> {
    let addr = Url::parse(&config.address)?;

    Ok(AMQPUri {
        scheme: AMQPScheme::from_str(addr.scheme())
            .map_err(|_| ServerError::InvalidScheme)?,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            host: addr.host_str().unwrap_or(DEFAULT_AMQP_HOST).into(),
            port: addr.port().unwrap_or(DEFAULT_AMQP_PORT),
        },
        vhost: config
            .vhost
            .clone()
            .unwrap_or(DEFAULT_AMQP_VHOST.to_string()),
        query: AMQPQueryString {
            channel_max: config.pool,
            ..Default::default()
        },
    })
}

impl RabbitMqQueue {
    /// Connect to RabbitMQ.
    pub async fn new(config: &Mail) -> Result<Self> {
        let uri = amqp_uri(config)?;

        let recovery_config =
            RecoveryConfig::default().auto_recover_connection();
        let conn_config = ConnectionProperties::default()
            .with_connection_name("activo_mail_client".into())
            .with_experimental_recovery_config(recovery_config);
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(address = %config.address, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn,
        })
    }

    async fn create_channel(&self) -> Result<Channel> {
        let channel = self.conn.create_channel().await?;
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }
}

#[async_trait]
impl JobQueue for RabbitMqQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        let channel = self.create_channel().await?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        Ok(())
    }
}
