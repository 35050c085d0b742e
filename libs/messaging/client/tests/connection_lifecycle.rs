//! Connection state machine, publish/subscribe and receive timing

mod common;

use bus_client::{BusError, Connection, ConnectionState, NO_WAIT, WAIT_FOREVER};
use common::{loopback_config, standard_fields, with_option};
use std::time::{Duration, Instant};
use types::{Field, Message, MessageKind};

async fn connected(config: &config::Config, component: &str) -> Connection {
    let mut connection = Connection::new(config);
    connection
        .message_factory_mut()
        .set_standard_fields(standard_fields(component));
    connection.connect().await.unwrap();
    connection
}

fn log_message(connection: &Connection, text: &str) -> Message {
    let mut message = connection.message_factory().create_message("LOG").unwrap();
    message.add_field(Field::new("SEVERITY", 1i16).unwrap());
    message.add_field(Field::new("MSG-TEXT", text).unwrap());
    message
}

#[test_log::test(tokio::test)]
async fn test_lifecycle_transitions() {
    let config = loopback_config("lifecycle");
    let mut connection = Connection::new(&config);
    assert_eq!(connection.state(), ConnectionState::Unconnected);

    connection.connect().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.library_version().unwrap().starts_with("loopback"));
    assert!(matches!(connection.connect().await, Err(BusError::Connection(_))));

    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(matches!(connection.disconnect().await, Err(BusError::NotConnected(_))));
    assert!(matches!(connection.connect().await, Err(BusError::Connection(_))));
}

#[tokio::test]
async fn test_connection_keeps_its_own_config_copy() {
    let mut config = loopback_config("config-copy");
    let mut connection = Connection::new(&config);
    assert!(config.clear_value("mw-id"));
    config.add_value("mw-server", "elsewhere");

    connection.connect().await.unwrap();
    assert_eq!(connection.config().value("mw-id"), Some("loopback"));
    assert_ne!(connection.config().value("mw-server"), Some("elsewhere"));
    connection.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_failures_leave_connection_unconnected() {
    let mut unconfigured = Connection::new(&config::Config::new());
    assert!(matches!(unconfigured.connect().await, Err(BusError::Connection(_))));
    assert_eq!(unconfigured.state(), ConnectionState::Unconnected);

    let config = with_option(loopback_config("simfail"), "mw-sim-connect-failure", "true");
    let mut simulated = Connection::new(&config);
    assert!(matches!(simulated.connect().await, Err(BusError::Connection(_))));
    assert_eq!(simulated.state(), ConnectionState::Unconnected);
}

#[tokio::test]
async fn test_publish_reaches_subscriber_with_auto_subject() {
    let config = loopback_config("pubsub");
    let mut publisher = connected(&config, "PUBLISHER").await;
    let mut listener = connected(&config, "LISTENER").await;
    listener.subscribe("C2MS.*.*.MSN.>").await.unwrap();

    let message = log_message(&publisher, "hello");
    publisher.publish(&message).await.unwrap();

    let received = listener.receive(1000).await.unwrap().expect("log message");
    assert_eq!(received.subject(), "C2MS.FILL.FILL.MSN.FILL.FILL.FILL.MSG.LOG.PUBLISHER");
    assert_eq!(received.string_value("MSG-TEXT").as_deref(), Some("hello"));
    assert!(received.has_field("PUBLISH-TIME"));
    assert!(!message.has_field("PUBLISH-TIME"));

    publisher.disconnect().await.unwrap();
    listener.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_is_idempotent_and_unsubscribe_stops_delivery() {
    let config = loopback_config("unsub");
    let mut connection = connected(&config, "SELF").await;

    let first = connection.subscribe("NEWS.>").await.unwrap();
    let second = connection.subscribe("NEWS.>").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(connection.subscriptions().len(), 1);

    connection
        .publish(&Message::new("NEWS.ONE", MessageKind::Publish))
        .await
        .unwrap();
    assert!(connection.receive(NO_WAIT).await.unwrap().is_some());

    connection.unsubscribe(&first).await.unwrap();
    assert!(connection.subscriptions().is_empty());
    connection
        .publish(&Message::new("NEWS.TWO", MessageKind::Publish))
        .await
        .unwrap();
    assert!(connection.receive(50).await.unwrap().is_none());

    assert!(matches!(
        connection.unsubscribe(&first).await,
        Err(BusError::InvalidArgument(_))
    ));
    assert!(matches!(
        connection.subscribe("BAD..PATTERN").await,
        Err(BusError::Validation(_))
    ));
}

#[tokio::test]
async fn test_receive_waits_at_least_the_timeout() {
    let config = loopback_config("timeout");
    let mut connection = connected(&config, "WAITER").await;
    connection.subscribe("QUIET.>").await.unwrap();

    let started = Instant::now();
    assert!(connection.receive(150).await.unwrap().is_none());
    assert!(started.elapsed() >= Duration::from_millis(150));

    let started = Instant::now();
    assert!(connection.receive(NO_WAIT).await.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_receive_wait_forever_returns_when_message_arrives() {
    let config = loopback_config("forever");
    let mut listener = connected(&config, "LISTENER").await;
    listener.subscribe("LATE.>").await.unwrap();

    let mut publisher = connected(&config, "PUBLISHER").await;
    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        publisher
            .publish(&Message::new("LATE.ARRIVAL", MessageKind::Publish))
            .await
            .unwrap();
        publisher.disconnect().await.unwrap();
    });

    let received = listener.receive(WAIT_FOREVER).await.unwrap().unwrap();
    assert_eq!(received.subject(), "LATE.ARRIVAL");
    sender.await.unwrap();
}

#[tokio::test]
async fn test_content_validation_blocks_invalid_messages() {
    let config = with_option(loopback_config("validate"), "msg-content-validate", "true");
    let mut connection = connected(&config, "CHECKED").await;
    connection.subscribe("C2MS.>").await.unwrap();

    let mut heartbeat = connection.message_factory().create_message("HB").unwrap();
    let err = connection.publish(&heartbeat).await.unwrap_err();
    assert!(matches!(err, BusError::Validation(_)));
    assert!(err.to_string().contains("PUB-RATE"));
    assert!(connection.receive(NO_WAIT).await.unwrap().is_none());

    heartbeat.add_field(Field::new("PUB-RATE", 10u16).unwrap());
    connection.publish(&heartbeat).await.unwrap();
    assert!(connection.receive(NO_WAIT).await.unwrap().is_some());
}

#[tokio::test]
async fn test_publish_rejects_bad_subjects_and_kinds() {
    let config = loopback_config("kinds");
    let mut connection = connected(&config, "KINDS").await;

    let empty = Message::new("", MessageKind::Publish);
    assert!(matches!(connection.publish(&empty).await, Err(BusError::Validation(_))));

    let request = connection.message_factory().create_message("REQ.DIR").unwrap();
    assert!(matches!(connection.publish(&request).await, Err(BusError::Validation(_))));
}

#[tokio::test]
async fn test_simulated_publish_failure() {
    let config = with_option(loopback_config("pubfail"), "mw-sim-publish-failure", "true");
    let mut connection = connected(&config, "FLAKY").await;
    let result = connection
        .publish(&Message::new("A.B", MessageKind::Publish))
        .await;
    assert!(matches!(result, Err(BusError::Transport(_))));
}
