//! Heartbeat generator
//!
//! Publishes `HB` messages announcing that a component is alive.

use super::{CycleHook, GeneratorState, PeriodicGenerator};
use crate::BusResult;
use config::Config;
use types::{Field, Message};

pub const HEARTBEAT_SCHEMA: &str = "HB";

/// Heartbeats need no per-cycle work beyond the sequence number
#[derive(Debug, Default)]
pub struct HeartbeatCycle;

impl CycleHook for HeartbeatCycle {}

#[derive(Debug)]
pub struct HeartbeatGenerator {
    inner: PeriodicGenerator<HeartbeatCycle>,
}

impl HeartbeatGenerator {
    /// `publish_rate` is in seconds; zero publishes a single heartbeat
    pub fn new(config: &Config, publish_rate: u16) -> BusResult<Self> {
        Self::with_fields(config, publish_rate, Vec::new())
    }

    /// Like [`new`](Self::new), with extra fields (typically the
    /// component's standard identity fields) on every heartbeat
    pub fn with_fields<I>(config: &Config, publish_rate: u16, fields: I) -> BusResult<Self>
    where
        I: IntoIterator<Item = Field>,
    {
        Ok(Self {
            inner: PeriodicGenerator::new(
                "heartbeat",
                config,
                HEARTBEAT_SCHEMA,
                publish_rate,
                fields,
                HeartbeatCycle,
            )?,
        })
    }

    pub async fn start(&mut self) -> BusResult<()> {
        self.inner.start().await
    }

    pub async fn stop(&mut self) -> BusResult<()> {
        self.inner.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn state(&self) -> GeneratorState {
        self.inner.state()
    }

    pub fn set_field(&self, field: Field) -> BusResult<bool> {
        self.inner.set_field(field)
    }

    pub fn change_publish_rate(&self, publish_rate: u16) -> BusResult<()> {
        self.inner.change_publish_rate(publish_rate)
    }

    pub fn publish_rate(&self) -> u16 {
        self.inner.publish_rate()
    }

    pub fn message(&self) -> Message {
        self.inner.message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusError;

    fn config() -> Config {
        Config::from_args(["mw-id=loopback", "mw-server=hb-unit"])
    }

    #[test]
    fn test_template_has_rate_and_fields() {
        let generator = HeartbeatGenerator::with_fields(
            &config(),
            5,
            [Field::header("COMPONENT", "HBTEST").unwrap()],
        )
        .unwrap();

        let message = generator.message();
        assert_eq!(message.schema_id(), Some("HB"));
        assert_eq!(message.integer_value("PUB-RATE"), Some(5));
        assert_eq!(message.string_value("COMPONENT").as_deref(), Some("HBTEST"));
        assert_eq!(generator.state(), GeneratorState::Idle);
    }

    #[test]
    fn test_rate_field_updates_interval() {
        let generator = HeartbeatGenerator::new(&config(), 5).unwrap();
        assert!(generator.set_field(Field::new("PUB-RATE", 12i32).unwrap()).unwrap());
        assert_eq!(generator.publish_rate(), 12);
        assert_eq!(
            generator.message().field("PUB-RATE").unwrap().kind(),
            types::FieldKind::U16
        );

        assert!(matches!(
            generator.set_field(Field::new("PUB-RATE", -3i32).unwrap()),
            Err(BusError::InvalidArgument(_))
        ));
        assert!(matches!(
            generator.set_field(Field::new("PUB-SEQ", -1i64).unwrap()),
            Err(BusError::InvalidArgument(_))
        ));
        assert_eq!(generator.publish_rate(), 12);
    }

    #[test]
    fn test_counter_fields_in_constructor() {
        let generator = HeartbeatGenerator::with_fields(
            &config(),
            5,
            [Field::new("PUB-RATE", 9u16).unwrap()],
        )
        .unwrap();
        assert_eq!(generator.publish_rate(), 9);

        let err = HeartbeatGenerator::with_fields(
            &config(),
            5,
            [Field::new("PUB-SEQ", -2i32).unwrap()],
        )
        .unwrap_err();
        assert!(matches!(err, BusError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut generator = HeartbeatGenerator::new(&config(), 1).unwrap();
        assert!(matches!(generator.stop().await, Err(BusError::IllegalState(_))));
    }
}
