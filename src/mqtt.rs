use std::{sync::Arc, time::Duration};

use crossbeam_channel::RecvTimeoutError;
use mqtt::{Message, Receiver};
use paho_mqtt as mqtt;

use crate::operation::ParamValue;
use crate::registry::ParameterRegistry;
use crate::shutdown::Shutdown;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Receives parameter updates on `<prefix>/<operation>/<tag>/set` and
/// echoes applied values on `<prefix>/<operation>/<tag>`.
pub struct MqttClient {
    client: mqtt::Client,
    receiver: Receiver<Option<Message>>,
    topics: Topics,
    registry: Arc<ParameterRegistry>,
}

struct Topics {
    prefix: String,
    status: String,
}

impl Topics {
    fn new(prefix: &str) -> Topics {
        Topics {
            prefix: prefix.to_string(),
            status: format!("{prefix}/status"),
        }
    }

    fn set(&self, name: &str) -> String {
        format!("{}/{}/set", self.prefix, name)
    }

    fn state(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// `lightsd/rainbow/speed/set` -> `rainbow/speed`
    fn parameter_name<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")
    }
}

impl MqttClient {
    fn make_availability_message(topic: &str, available: &str) -> mqtt::Message {
        let payload = json::object! {
            available: available
        };

        return mqtt::Message::new_retained(topic, json::stringify(payload), 0);
    }

    pub fn new(
        url: &str,
        client_id: &str,
        topic_prefix: &str,
        registry: Arc<ParameterRegistry>,
    ) -> mqtt::Result<MqttClient> {
        let topics = Topics::new(topic_prefix);

        let create_opts = mqtt::CreateOptionsBuilder::new()
            .server_uri(url)
            .client_id(client_id)
            .finalize();
        let client = mqtt::Client::new(create_opts)?;

        let conn_opts = mqtt::ConnectOptionsBuilder::new()
            .keep_alive_interval(Duration::from_secs(20))
            .clean_session(true)
            .will_message(MqttClient::make_availability_message(
                &topics.status,
                "offline",
            ))
            .finalize();

        client.connect(conn_opts)?;
        log::info!("Connected to broker at {url}");

        let receiver = client.start_consuming();
        let mqtt_client = MqttClient {
            client,
            receiver,
            topics,
            registry,
        };

        mqtt_client.subscribe()?;
        mqtt_client.publish_availability("online");
        mqtt_client.publish_all_states();
        Ok(mqtt_client)
    }

    fn subscribe(&self) -> mqtt::Result<()> {
        let topics: Vec<String> = self
            .registry
            .names()
            .map(|name| self.topics.set(name))
            .collect();
        if topics.is_empty() {
            return Ok(());
        }

        let qos = vec![0; topics.len()];
        self.client.subscribe_many(&topics, &qos)?;
        for topic in &topics {
            log::info!("Subscribed to {topic}");
        }
        Ok(())
    }

    fn publish_availability(&self, available: &str) {
        let msg = MqttClient::make_availability_message(&self.topics.status, available);
        if let Err(err) = self.client.publish(msg) {
            log::warn!("Failed to publish availability: {err}");
        }
    }

    fn publish_state(&self, name: &str, value: &ParamValue) {
        let topic = self.topics.state(name);
        let msg = mqtt::Message::new_retained(topic.as_str(), value.to_string(), 0);
        log::debug!("Publishing {topic}: {value}");
        if let Err(err) = self.client.publish(msg) {
            log::warn!("Publishing failed: {err}");
        }
    }

    fn publish_all_states(&self) {
        for name in self.registry.names() {
            if let Some(value) = self.registry.get(name) {
                self.publish_state(name, &value);
            }
        }
    }

    fn reconnect(&self) {
        if let Err(err) = self.client.reconnect() {
            log::warn!("Reconnection failed: {err}");
            return;
        }

        log::info!("Reconnected to broker");
        if let Err(err) = self.subscribe() {
            log::warn!("Failed to subscribe after reconnecting: {err}");
        }
        self.publish_availability("online");
    }

    pub fn run(&self, shutdown: &Shutdown) {
        while !shutdown.is_requested() {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(Some(msg)) => self.handle_message(&msg),
                Ok(None) => {
                    if !self.client.is_connected() {
                        log::warn!("Lost connection to broker");
                        self.reconnect();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!("MQTT message stream ended");
                    break;
                }
            };
        }
    }

    fn handle_message(&self, msg: &Message) {
        if let Some((name, value)) = apply_message(&self.topics, &self.registry, msg) {
            self.publish_state(name, &value);
        }
    }
}

/// Applies a `.../set` message. Returns the parameter name and its new value
/// when something was stored.
fn apply_message<'a>(
    topics: &Topics,
    registry: &ParameterRegistry,
    msg: &'a Message,
) -> Option<(&'a str, ParamValue)> {
    let Some(name) = topics.parameter_name(msg.topic()) else {
        log::warn!("Ignoring message on unexpected topic {}", msg.topic());
        return None;
    };

    let payload = match std::str::from_utf8(msg.payload()) {
        Ok(payload) => payload,
        Err(err) => {
            log::warn!("Dropping update on {}: payload is not UTF-8: {err}", msg.topic());
            return None;
        }
    };

    registry.handle(name, payload).ok().map(|value| (name, value))
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.publish_availability("offline");
        if let Err(err) = self.client.disconnect(None) {
            // We don't really care about errors here, but let's make rustc happy.
            log::error!("{:?}", err);
        }
    }
}
