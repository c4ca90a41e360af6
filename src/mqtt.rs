use crate::config::Config;
use crate::error::TransportError;
use crate::monitor::ColdStoreMonitor;
use crate::persistence::PersistenceGateway;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS,
    SubscribeReasonCode,
};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// A connected client whose subscription the broker has acknowledged.
pub struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

fn mqtt_options(config: &Config) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt_username {
        options.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }
    options
}

/// Connects and subscribes to the reading topic, waiting for CONNACK and SUBACK.
pub async fn connect(config: &Config) -> Result<Session, TransportError> {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), 32);
    client
        .subscribe(config.mqtt_topic.clone(), QoS::AtLeastOnce)
        .await?;

    let wait = config.mqtt_connect_timeout();
    let handshake = async {
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Incoming::ConnAck(ack)) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(TransportError::Refused(ack.code));
                    }
                }
                Event::Incoming(Incoming::SubAck(ack)) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(TransportError::SubscribeRejected(config.mqtt_topic.clone()));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
    };
    match timeout(wait, handshake).await {
        Ok(Ok(())) => Ok(Session { client, eventloop }),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(TransportError::Timeout(wait)),
    }
}

/// Feeds every reading published on the topic into the monitor until `cancel` fires.
///
/// `session` is the connection established at startup; later connections are made here with
/// backoff. When `gateway` is set, transport readings are stored too.
pub async fn run_listener(
    config: Config,
    monitor: ColdStoreMonitor,
    gateway: Option<Arc<dyn PersistenceGateway>>,
    session: Session,
    cancel: CancellationToken,
) {
    let stats = monitor.stats();
    let mut backoff = Backoff::default();
    let mut pending = Some(session);

    loop {
        let session = match pending.take() {
            Some(session) => session,
            None => {
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => break,
                    attempt = connect(&config) => attempt,
                };
                match attempt {
                    Ok(session) => session,
                    Err(err) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error=%err, retry_in=?delay, "MQTT reconnect failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(delay) => continue,
                        }
                    }
                }
            }
        };

        backoff.reset();
        stats.set_transport_connected(true);
        tracing::info!(topic=%config.mqtt_topic, "subscribed to reading feed");

        let Session {
            client,
            mut eventloop,
        } = session;
        let stopped = loop {
            tokio::select! {
                _ = cancel.cancelled() => break true,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let mut payload = publish.payload.to_vec();
                        handle_payload(&monitor, gateway.as_deref(), &publish.topic, &mut payload)
                            .await;
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        tracing::warn!("broker sent DISCONNECT; reconnecting");
                        break false;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        stats.record_error(err.to_string());
                        tracing::warn!(error=%err, "MQTT connection dropped; reconnecting");
                        break false;
                    }
                }
            }
        };

        stats.set_transport_connected(false);
        if stopped {
            disconnect(&client, &mut eventloop).await;
            break;
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    tracing::info!("MQTT listener stopped");
}

async fn handle_payload(
    monitor: &ColdStoreMonitor,
    gateway: Option<&dyn PersistenceGateway>,
    topic: &str,
    payload: &mut [u8],
) {
    let processed = match monitor.process_payload(payload).await {
        Ok(processed) => processed,
        Err(err) => {
            tracing::warn!(error=%err, topic=%topic, "dropping undecodable reading");
            return;
        }
    };
    let Some(gateway) = gateway else {
        return;
    };
    if let Err(err) = gateway.insert(&processed.reading).await {
        monitor
            .stats()
            .record_persistence_failure(err.to_string());
        tracing::warn!(error=%err, unit = processed.reading.unit_id(), "failed to store MQTT reading");
    }
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if client.disconnect().await.is_err() {
        return;
    }
    // The DISCONNECT packet is only written while the event loop is polled.
    let _ = timeout(Duration::from_secs(1), async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
}
