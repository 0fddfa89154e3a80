//! Databus client handle and ingest task.

use crate::config::DatabusConfig;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tagbus_core::{Quality, Tag, TagStore, TagValue};
use tagbus_proto::{DataFrame, MetadataFrame, TagDirectory, TopicKind, TopicScheme, WriteFrame};
use tokio::sync::RwLock;
use url::Url;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// State shared between client handles and the ingest task.
struct Shared {
    store: RwLock<TagStore>,
    directory: RwLock<TagDirectory>,
    write_topic: RwLock<String>,
    listening: AtomicBool,
    write_seq: AtomicU64,
}

/// Handle to a running databus client.
///
/// Cloning is cheap; all clones share the same tag store and MQTT session.
/// The background ingest task stops once every handle has been dropped.
#[derive(Clone)]
pub struct Databus {
    client: AsyncClient,
    shared: Arc<Shared>,
}

impl Databus {
    /// Connect to the databus broker and spawn the ingest task.
    ///
    /// The client starts paused; call [`Databus::start`] to begin applying
    /// inbound tag updates.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn connect(config: DatabusConfig) -> Result<Self, DatabusError> {
        let (host, port) = parse_mqtt_url(&config.broker)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_credentials(&config.username, &config.password);

        let (client, eventloop) = AsyncClient::new(mqtt_options, config.channel_capacity);

        let shared = Arc::new(Shared {
            store: RwLock::new(TagStore::new()),
            directory: RwLock::new(TagDirectory::new()),
            write_topic: RwLock::new(config.scheme.write(&config.write_connection)),
            listening: AtomicBool::new(false),
            write_seq: AtomicU64::new(0),
        });

        tokio::spawn(ingest_loop(
            eventloop,
            client.clone(),
            Arc::downgrade(&shared),
            config.scheme,
        ));

        Ok(Self { client, shared })
    }

    /// Enable applying inbound tag updates.
    pub fn start(&self) {
        self.shared.listening.store(true, Ordering::SeqCst);
        tracing::info!("Listening for databus updates");
    }

    /// Disable applying inbound tag updates.
    ///
    /// The MQTT session stays up; updates arriving while stopped are
    /// discarded. [`Databus::start`] resumes without resubscribing.
    pub fn stop(&self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        tracing::info!("Stopped listening for databus updates");
    }

    /// Whether inbound updates are currently being applied.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    /// Take an owned snapshot of the tag store.
    pub async fn tags(&self) -> TagStore {
        self.shared.store.read().await.clone()
    }

    /// Look up the current state of a single tag.
    pub async fn tag(&self, name: &str) -> Option<Tag> {
        self.shared.store.read().await.get(name).cloned()
    }

    /// Take an owned snapshot of the tag directory.
    pub async fn directory(&self) -> TagDirectory {
        self.shared.directory.read().await.clone()
    }

    /// The current outbound write topic.
    pub async fn write_topic(&self) -> String {
        self.shared.write_topic.read().await.clone()
    }

    /// Replace the outbound write topic.
    pub async fn set_write_topic(&self, topic: impl Into<String>) {
        let topic = topic.into();
        tracing::debug!(topic, "Write topic changed");
        *self.shared.write_topic.write().await = topic;
    }

    /// Publish a value for a named tag.
    ///
    /// The tag name is resolved to its data point id through the directory
    /// built from connector metadata, wrapped in a write frame with the next
    /// sequence number, and published to the current write topic at QoS 1.
    ///
    /// # Errors
    ///
    /// Returns error if the tag name is unknown or the publish fails.
    pub async fn write_to_tag(
        &self,
        name: &str,
        value: impl Into<TagValue>,
    ) -> Result<(), DatabusError> {
        let id = {
            let directory = self.shared.directory.read().await;
            directory
                .id_for(name)
                .map(ToString::to_string)
                .ok_or_else(|| DatabusError::UnknownTag(name.to_string()))?
        };

        let seq = self.shared.write_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = WriteFrame::single(seq, id, value.into().into_json());
        let payload = frame
            .to_json()
            .map_err(|e| DatabusError::Encode(e.to_string()))?;

        let topic = self.shared.write_topic.read().await.clone();
        tracing::debug!(topic, tag = name, seq, "Publishing tag write");

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DatabusError::Publish(e.to_string()))
    }
}

/// Background task polling the MQTT event loop.
async fn ingest_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Weak<Shared>,
    scheme: TopicScheme,
) {
    loop {
        let event = eventloop.poll().await;

        let Some(shared) = shared.upgrade() else {
            tracing::debug!("All databus handles dropped, stopping ingest task");
            break;
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to databus broker");
                if let Err(e) = subscribe_all(&client, &scheme).await {
                    tracing::error!(error = %e, "Failed to subscribe to databus topics");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&shared, &scheme, &publish.topic, &publish.payload).await;
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::debug!("Subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Subscribe to the connector's metadata and data topics.
async fn subscribe_all(client: &AsyncClient, scheme: &TopicScheme) -> Result<(), DatabusError> {
    for topic in [scheme.metadata(), scheme.read_wildcard()] {
        tracing::info!(topic, "Subscribing to databus topic");
        client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| DatabusError::Subscribe(e.to_string()))?;
    }
    Ok(())
}

/// Dispatch one inbound publish.
async fn handle_publish(shared: &Shared, scheme: &TopicScheme, topic: &str, payload: &[u8]) {
    match scheme.classify(topic) {
        Some(TopicKind::Metadata) => match MetadataFrame::from_json(payload) {
            Ok(meta) => {
                let directory = TagDirectory::from_metadata(&meta);
                tracing::info!(tags = directory.len(), "Tag directory updated from metadata");
                *shared.directory.write().await = directory;
            }
            Err(e) => {
                tracing::warn!(error = %e, topic, "Failed to decode metadata frame");
            }
        },
        Some(TopicKind::Data { connection_name }) => {
            if !shared.listening.load(Ordering::SeqCst) {
                tracing::trace!(topic, "Listening disabled, discarding data frame");
                return;
            }

            match DataFrame::from_json(payload) {
                Ok(frame) => {
                    tracing::debug!(
                        connection = %connection_name,
                        seq = frame.seq,
                        vals = frame.vals.len(),
                        "Received data frame"
                    );
                    let directory = shared.directory.read().await;
                    let mut store = shared.store.write().await;
                    apply_data_frame(&mut store, &directory, &frame, Utc::now());
                }
                Err(e) => {
                    tracing::warn!(error = %e, topic, "Failed to decode data frame");
                }
            }
        }
        // Our own writes echoed back, or topics outside the scheme
        Some(TopicKind::Write { .. }) | None => {
            tracing::trace!(topic, "Ignoring non-data publish");
        }
    }
}

/// Apply a decoded data frame to the store.
///
/// Data points whose id is not in the directory are skipped; the connector
/// only serves tags it announced via metadata. Missing `ts` falls back to
/// the receive time, missing `qc` to good quality.
fn apply_data_frame(
    store: &mut TagStore,
    directory: &TagDirectory,
    frame: &DataFrame,
    received_at: DateTime<Utc>,
) {
    for point in &frame.vals {
        let Some(name) = directory.name_for(&point.id) else {
            tracing::debug!(id = %point.id, "Data point id not in tag directory, skipping");
            continue;
        };

        let ts = point.ts.unwrap_or(received_at);
        let qc = point.qc.map_or(Quality::Good, Quality::from);
        store.upsert(name, Tag::new(TagValue::from(point.val.clone()), ts, qc));
    }
}

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Parse a broker address into host and port.
///
/// Accepts `tcp://host[:port]`, `mqtt://host[:port]`, or a bare
/// `host[:port]`; the port defaults to 1883.
fn parse_mqtt_url(input: &str) -> Result<(String, u16), DatabusError> {
    let invalid = |reason: &str| DatabusError::InvalidBrokerUrl(format!("{input}: {reason}"));

    if input.contains("://") {
        let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(invalid(&format!("unsupported scheme '{}'", url.scheme())));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        return Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)));
    }

    match input.rsplit_once(':') {
        None if input.is_empty() => Err(invalid("missing host")),
        None => Ok((input.to_string(), DEFAULT_MQTT_PORT)),
        Some((host, _)) if host.contains(':') => Err(invalid("too many ':' separators")),
        Some((host, _)) if host.is_empty() => Err(invalid("missing host")),
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| invalid(&format!("invalid port '{port}'")))?;
            Ok((host.to_string(), port))
        }
    }
}

/// Errors for databus client operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabusError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Tag name not present in the directory
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    /// Frame encoding failed
    #[error("encode error: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagbus_proto::{
        ConnectionMeta, DataPoint, DataPointDefinition, DataPointGroup, MetadataFrame,
    };

    fn directory() -> TagDirectory {
        let mut directory = TagDirectory::new();
        directory.insert("Q_VFD3_Temperature".to_string(), "101".to_string());
        directory.insert("I_TwoWayCommunicator".to_string(), "103".to_string());
        directory
    }

    fn frame(points: Vec<DataPoint>) -> DataFrame {
        DataFrame {
            seq: 1,
            vals: points,
        }
    }

    #[test]
    fn broker_url_with_scheme_and_port() {
        assert_eq!(
            parse_mqtt_url("tcp://edge-gateway:2883").unwrap(),
            ("edge-gateway".to_string(), 2883)
        );
    }

    #[test]
    fn broker_url_port_defaults_to_1883() {
        assert_eq!(
            parse_mqtt_url("mqtt://ie-databus").unwrap(),
            ("ie-databus".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("ie-databus").unwrap(),
            ("ie-databus".to_string(), 1883)
        );
    }

    #[test]
    fn broker_url_bare_host_port() {
        assert_eq!(
            parse_mqtt_url("127.0.0.1:1884").unwrap(),
            ("127.0.0.1".to_string(), 1884)
        );
    }

    #[test]
    fn broker_url_rejects_bad_input() {
        assert!(parse_mqtt_url("http://edge-gateway:1883").is_err());
        assert!(parse_mqtt_url("edge-gateway:not-a-port").is_err());
        assert!(parse_mqtt_url("a:b:c").is_err());
        assert!(parse_mqtt_url("").is_err());
        assert!(parse_mqtt_url(":1883").is_err());
    }

    #[test]
    fn apply_updates_known_tags() {
        let mut store = TagStore::new();
        let received_at = Utc::now();

        apply_data_frame(
            &mut store,
            &directory(),
            &frame(vec![DataPoint {
                id: "101".to_string(),
                val: serde_json::json!(87.5),
                ts: Some("2024-05-17T12:38:09Z".parse().unwrap()),
                qc: Some(3),
            }]),
            received_at,
        );

        let tag = store.get("Q_VFD3_Temperature").unwrap();
        assert_eq!(tag.val.as_f64(), Some(87.5));
        assert_eq!(tag.ts, "2024-05-17T12:38:09Z".parse::<DateTime<Utc>>().unwrap());
        assert!(tag.is_good());
    }

    #[test]
    fn apply_skips_unknown_ids() {
        let mut store = TagStore::new();

        apply_data_frame(
            &mut store,
            &directory(),
            &frame(vec![DataPoint {
                id: "999".to_string(),
                val: serde_json::json!(1),
                ts: None,
                qc: None,
            }]),
            Utc::now(),
        );

        assert!(store.is_empty());
    }

    #[test]
    fn apply_defaults_ts_and_qc() {
        let mut store = TagStore::new();
        let received_at = Utc::now();

        apply_data_frame(
            &mut store,
            &directory(),
            &frame(vec![DataPoint {
                id: "103".to_string(),
                val: serde_json::json!(true),
                ts: None,
                qc: None,
            }]),
            received_at,
        );

        let tag = store.get("I_TwoWayCommunicator").unwrap();
        assert_eq!(tag.ts, received_at);
        assert_eq!(tag.qc, Quality::Good);
        assert_eq!(tag.val.as_bool(), Some(true));
    }

    #[test]
    fn apply_bad_quality_is_kept() {
        let mut store = TagStore::new();

        apply_data_frame(
            &mut store,
            &directory(),
            &frame(vec![DataPoint {
                id: "101".to_string(),
                val: serde_json::json!(0),
                ts: None,
                qc: Some(0),
            }]),
            Utc::now(),
        );

        let tag = store.get("Q_VFD3_Temperature").unwrap();
        assert!(!tag.is_good());
        assert_eq!(tag.qc, Quality::Bad);
    }

    #[tokio::test]
    async fn listening_toggle() {
        let config = crate::DatabusConfig {
            broker: "tcp://localhost:1883".to_string(),
            ..crate::DatabusConfig::default()
        };
        let databus = Databus::connect(config).unwrap();

        assert!(!databus.is_listening());
        databus.start();
        assert!(databus.is_listening());
        databus.stop();
        assert!(!databus.is_listening());
    }

    #[tokio::test]
    async fn write_topic_is_mutable() {
        let databus = Databus::connect(crate::DatabusConfig::default()).unwrap();

        assert_eq!(
            databus.write_topic().await,
            "ie/d/j/simatic/v1/s7c1/dp/w/Connection_1"
        );

        databus.set_write_topic("new/mqtt/topic").await;
        assert_eq!(databus.write_topic().await, "new/mqtt/topic");
    }

    #[tokio::test]
    async fn write_to_unknown_tag_is_an_error() {
        let databus = Databus::connect(crate::DatabusConfig::default()).unwrap();

        let err = databus.write_to_tag("NoSuchTag", true).await.unwrap_err();
        assert!(matches!(err, DatabusError::UnknownTag(name) if name == "NoSuchTag"));
    }

    #[tokio::test]
    async fn write_sequence_starts_at_one_and_increments() {
        let databus = Databus::connect(crate::DatabusConfig::default()).unwrap();
        {
            let mut directory = databus.shared.directory.write().await;
            directory.insert("I_TwoWayCommunicator".to_string(), "103".to_string());
        }

        // The publish queues in the client's request channel, so this works
        // without a broker. fetch_add(1) + 1 means the first frame goes out
        // with seq 1 and the counter afterwards equals the last seq used.
        assert_eq!(databus.shared.write_seq.load(Ordering::SeqCst), 0);

        databus
            .write_to_tag("I_TwoWayCommunicator", true)
            .await
            .unwrap();
        assert_eq!(databus.shared.write_seq.load(Ordering::SeqCst), 1);

        databus
            .write_to_tag("I_TwoWayCommunicator", false)
            .await
            .unwrap();
        assert_eq!(databus.shared.write_seq.load(Ordering::SeqCst), 2);

        // Clones share the handle's sequence
        let clone = databus.clone();
        clone
            .write_to_tag("I_TwoWayCommunicator", true)
            .await
            .unwrap();
        assert_eq!(databus.shared.write_seq.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn metadata_publish_rebuilds_directory() {
        let databus = Databus::connect(crate::DatabusConfig::default()).unwrap();
        let scheme = TopicScheme::default();

        let payload = serde_json::to_vec(&MetadataFrame {
            seq: 1,
            connections: vec![ConnectionMeta {
                name: "Connection_1".to_string(),
                data_points: vec![DataPointGroup {
                    name: "dp".to_string(),
                    topic: None,
                    publish_type: Some("bulk".to_string()),
                    data_point_definitions: vec![DataPointDefinition {
                        name: "I_Conveyor1Status".to_string(),
                        id: "104".to_string(),
                        data_type: Some("Int".to_string()),
                    }],
                }],
            }],
        })
        .unwrap();

        handle_publish(&databus.shared, &scheme, &scheme.metadata(), &payload).await;

        let directory = databus.directory().await;
        assert_eq!(directory.id_for("I_Conveyor1Status"), Some("104"));
    }

    #[tokio::test]
    async fn data_publish_respects_listening_flag() {
        let databus = Databus::connect(crate::DatabusConfig::default()).unwrap();
        let scheme = TopicScheme::default();

        {
            let mut directory = databus.shared.directory.write().await;
            directory.insert("Q_VFD4_Temperature".to_string(), "102".to_string());
        }

        let payload = br#"{"seq": 1, "vals": [{"id": "102", "val": 101.0, "qc": 3}]}"#;
        let topic = scheme.read("Connection_1");

        // Paused: the frame must be discarded
        handle_publish(&databus.shared, &scheme, &topic, payload).await;
        assert!(databus.tag("Q_VFD4_Temperature").await.is_none());

        databus.start();
        handle_publish(&databus.shared, &scheme, &topic, payload).await;
        let tag = databus.tag("Q_VFD4_Temperature").await.unwrap();
        assert_eq!(tag.val.as_f64(), Some(101.0));
    }
}
