//! rumqttc 实现的 broker 连接器。
//!
//! 每次 `connect` 新建 `AsyncClient` 与 `EventLoop`，等到 ConnAck 才算连接成功；
//! 会话出错后整个 EventLoop 丢弃，重连由 `IngressClient` 的状态机负责。

use crate::{BrokerConnector, BrokerSession, IngestError};
use async_trait::async_trait;
use domain::{RawEvent, now_epoch_ms};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;

/// MQTT 连接配置。
#[derive(Debug, Clone)]
pub struct MqttConnectorConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_seconds: u64,
}

/// MQTT 连接器。
#[derive(Debug, Clone)]
pub struct MqttConnector {
    config: MqttConnectorConfig,
}

impl MqttConnector {
    pub fn new(config: MqttConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttConnectorConfig {
        &self.config
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("iot-ingest-{}", now_epoch_ms());
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_seconds.max(5)));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, IngestError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 64);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(IngestError::Connect(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(_) => {}
                Err(err) => return Err(IngestError::Connect(err.to_string())),
            }
        }
        Ok(Box::new(MqttSession { client, eventloop }))
    }
}

struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, topics: &[&str]) -> Result<(), IngestError> {
        for topic in topics {
            self.client
                .subscribe(*topic, QoS::AtLeastOnce)
                .await
                .map_err(|err| IngestError::Subscribe(format!("{topic}: {err}")))?;
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RawEvent>, IngestError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(RawEvent {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        received_at_ms: now_epoch_ms(),
                    }));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                Ok(_) => {}
                Err(err) => return Err(IngestError::Connection(err.to_string())),
            }
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        // 尽力通知 broker；请求队列满时直接放弃
        let _ = self.client.try_disconnect();
    }
}
