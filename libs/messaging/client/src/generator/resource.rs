//! Resource generator
//!
//! Publishes `RSRC` messages describing host utilisation. Between
//! publications the host is sampled every `sample_interval` seconds; each
//! message carries the latest reading plus min/max/average over a moving
//! window spanning `average_interval` seconds.

use super::sampler::{ResourceSource, SampleWindow, SystemResourceSource};
use super::{CycleHook, GeneratorState, PeriodicGenerator};
use crate::{BusError, BusResult, MessageFactory};
use config::Config;
use std::time::Duration;
use tracing::warn;
use types::{Field, Message};

pub const RESOURCE_SCHEMA: &str = "RSRC";
pub const OPER_SYS: &str = "OPER-SYS";

#[derive(Debug)]
pub struct ResourceCycle {
    source: Box<dyn ResourceSource>,
    window: SampleWindow,
    sample_interval: Duration,
}

impl ResourceCycle {
    fn new(source: Box<dyn ResourceSource>, sample_interval: u16, average_interval: u16) -> Self {
        Self {
            source,
            window: SampleWindow::new(usize::from(average_interval / sample_interval)),
            sample_interval: Duration::from_secs(u64::from(sample_interval)),
        }
    }
}

impl CycleHook for ResourceCycle {
    fn sample_interval(&self) -> Option<Duration> {
        Some(self.sample_interval)
    }

    fn sample(&mut self) {
        let sample = self.source.sample();
        self.window.push(sample);
    }

    fn before_publish(&mut self, message: &mut Message) {
        self.sample();
        if let Err(e) = self.window.apply_to(message) {
            warn!(error = %e, "Cannot attach resource statistics");
        }
    }
}

/// `sample_interval >= 1` and `average_interval >= sample_interval`
fn check_intervals(sample_interval: u16, average_interval: u16) -> BusResult<()> {
    if sample_interval < 1 {
        return Err(BusError::InvalidArgument(
            "sample interval must be at least 1 second".to_string(),
        ));
    }
    if average_interval < sample_interval {
        return Err(BusError::InvalidArgument(format!(
            "average interval ({average_interval}s) must not be shorter than the sample interval ({sample_interval}s)"
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct ResourceGenerator {
    inner: PeriodicGenerator<ResourceCycle>,
}

impl ResourceGenerator {
    pub fn new(
        config: &Config,
        publish_rate: u16,
        sample_interval: u16,
        average_interval: u16,
    ) -> BusResult<Self> {
        Self::with_source(
            config,
            publish_rate,
            sample_interval,
            average_interval,
            SystemResourceSource::new(),
            Vec::new(),
        )
    }

    /// Build a generator that reads resources from `source` and adds
    /// `fields` to every message
    pub fn with_source<S, I>(
        config: &Config,
        publish_rate: u16,
        sample_interval: u16,
        average_interval: u16,
        source: S,
        fields: I,
    ) -> BusResult<Self>
    where
        S: ResourceSource,
        I: IntoIterator<Item = Field>,
    {
        check_intervals(sample_interval, average_interval)?;

        let os = source.os_version();
        let cycle = ResourceCycle::new(Box::new(source), sample_interval, average_interval);
        let inner = PeriodicGenerator::new(
            "resource",
            config,
            RESOURCE_SCHEMA,
            publish_rate,
            fields,
            cycle,
        )?;
        inner.set_field(Field::new(OPER_SYS, os)?)?;
        Ok(Self { inner })
    }

    /// One-off resource message from the local host, built with `factory`
    pub fn create_resource_message(
        factory: &MessageFactory,
        sample_interval: u16,
        average_interval: u16,
    ) -> BusResult<Message> {
        Self::create_resource_message_from(
            factory,
            sample_interval,
            average_interval,
            &mut SystemResourceSource::new(),
        )
    }

    pub fn create_resource_message_from(
        factory: &MessageFactory,
        sample_interval: u16,
        average_interval: u16,
        source: &mut dyn ResourceSource,
    ) -> BusResult<Message> {
        check_intervals(sample_interval, average_interval)?;

        let mut message = factory.create_message(RESOURCE_SCHEMA)?;
        message.add_field(Field::new(OPER_SYS, source.os_version())?);

        let mut window = SampleWindow::new(usize::from(average_interval / sample_interval));
        window.push(source.sample());
        window.apply_to(&mut message)?;
        Ok(message)
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
