//! # Periodic Generators
//!
//! A [`PeriodicGenerator`] owns a private [`Connection`] and publishes a
//! template message on a fixed schedule from a background task. The first
//! publication happens as soon as the generator starts; after that one
//! message goes out every `PUB-RATE` seconds, each with the next `PUB-SEQ`.
//! A rate of zero publishes once and then idles until stopped.
//!
//! ## Ownership
//!
//! The connection moves into the spawned task on `start` and comes back
//! through the task's `JoinHandle` on `stop`, which then disconnects it.
//! The template message lives behind a mutex so fields can be changed
//! while the generator runs.
//!
//! Variant behaviour (resource sampling, last-moment field updates) plugs
//! in through [`CycleHook`].

pub mod heartbeat;
pub mod resource;
pub mod sampler;

pub use heartbeat::HeartbeatGenerator;
pub use resource::ResourceGenerator;

use crate::{options, validation, BusError, BusResult, Connection};
use config::Config;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use types::{Field, FieldValue, Message};

pub const PUB_RATE: &str = "PUB-RATE";
pub const PUB_SEQ: &str = "PUB-SEQ";

/// How often an idle loop re-reads the publish rate
const RATE_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Running,
    Stopped,
}

/// Variant-specific work inside the publish loop
pub trait CycleHook: Send + Debug + 'static {
    /// Interval between background samples, if the variant samples
    fn sample_interval(&self) -> Option<Duration> {
        None
    }

    fn sample(&mut self) {}

    /// Last chance to update the outgoing message
    fn before_publish(&mut self, _message: &mut Message) {}
}

#[derive(Debug)]
struct Schedule {
    message: Message,
    publish_rate: u16,
    next_sequence: u32,
}

impl Schedule {
    /// Sequence numbers start at 1 and skip 0 on wraparound
    fn take_sequence(&mut self) -> u32 {
        if self.next_sequence == 0 {
            self.next_sequence = 1;
        }
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }
}

#[derive(Debug)]
pub struct PeriodicGenerator<H: CycleHook> {
    label: &'static str,
    state: GeneratorState,
    connection: Option<Connection>,
    schedule: Arc<Mutex<Schedule>>,
    hook: Option<H>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Connection>>,
    validate: bool,
}

impl<H: CycleHook> PeriodicGenerator<H> {
    pub(crate) fn new<I>(
        label: &'static str,
        config: &Config,
        schema_id: &str,
        publish_rate: u16,
        fields: I,
        hook: H,
    ) -> BusResult<Self>
    where
        I: IntoIterator<Item = Field>,
    {
        let mut connection = Connection::new(config);
        let (counters, standard): (Vec<Field>, Vec<Field>) = fields
            .into_iter()
            .partition(|f| f.name() == PUB_RATE || f.name() == PUB_SEQ);

        // Caller fields act as the generator connection's standard fields
        connection.message_factory_mut().set_standard_fields(standard);
        let mut message = connection.message_factory().create_message(schema_id)?;
        message.add_field(Field::new(PUB_RATE, publish_rate)?);

        let generator = Self {
            label,
            state: GeneratorState::Idle,
            connection: Some(connection),
            schedule: Arc::new(Mutex::new(Schedule {
                message,
                publish_rate,
                next_sequence: 1,
            })),
            hook: Some(hook),
            shutdown: None,
            task: None,
            validate: options::validation_enabled(config),
        };

        for field in counters {
            generator.set_field(field)?;
        }
        Ok(generator)
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GeneratorState::Running
    }

    pub fn publish_rate(&self) -> u16 {
        self.schedule.lock().publish_rate
    }

    /// Snapshot of the template message
    pub fn message(&self) -> Message {
        self.schedule.lock().message.clone()
    }

    /// Add or replace a field on the published message.
    ///
    /// `PUB-RATE` also changes the publish interval and `PUB-SEQ` resets the
    /// sequence counter; both reject negative values. Returns true when an
    /// existing field was replaced.
    pub fn set_field(&self, field: Field) -> BusResult<bool> {
        let mut schedule = self.schedule.lock();
        match field.name() {
            PUB_RATE => {
                let rate = non_negative(&field)?;
                let rate = u16::try_from(rate).map_err(|_| {
                    BusError::InvalidArgument(format!("{PUB_RATE} {rate} exceeds {}", u16::MAX))
                })?;
                schedule.publish_rate = rate;
                Ok(schedule.message.add_field(Field::new(PUB_RATE, rate)?))
            }
            PUB_SEQ => {
                let sequence = non_negative(&field)?;
                let sequence = u32::try_from(sequence).map_err(|_| {
                    BusError::InvalidArgument(format!("{PUB_SEQ} {sequence} exceeds {}", u32::MAX))
                })?;
                schedule.next_sequence = sequence;
                Ok(schedule.message.add_field(Field::new(PUB_SEQ, sequence)?))
            }
            _ => Ok(schedule.message.add_field(field)),
        }
    }

    pub fn change_publish_rate(&self, publish_rate: u16) -> BusResult<()> {
        self.set_field(Field::new(PUB_RATE, publish_rate)?)?;
        Ok(())
    }

    pub async fn start(&mut self) -> BusResult<()> {
        if self.state != GeneratorState::Idle {
            return Err(BusError::IllegalState(format!(
                "{} generator cannot start from {:?}",
                self.label, self.state
            )));
        }
        let mut connection = self.connection.take().ok_or_else(|| {
            BusError::IllegalState(format!("{} generator has no connection", self.label))
        })?;

        if self.validate {
            let snapshot = self.message();
            if let Err(e) =
                validation::validate_content(&snapshot, connection.message_factory().directory())
            {
                self.connection = Some(connection);
                return Err(e);
            }
        }
        if let Err(e) = connection.connect().await {
            self.connection = Some(connection);
            return Err(e);
        }

        let hook = self.hook.take().ok_or_else(|| {
            BusError::IllegalState(format!("{} generator was already started", self.label))
        })?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.task = Some(tokio::spawn(run_cycle(
            self.label,
            connection,
            Arc::clone(&self.schedule),
            hook,
            shutdown_rx,
        )));
        self.shutdown = Some(shutdown_tx);
        self.state = GeneratorState::Running;
        Ok(())
    }

    /// Stop publishing and disconnect. No message is published after this
    /// returns.
    pub async fn stop(&mut self) -> BusResult<()> {
        if self.state != GeneratorState::Running {
            return Err(BusError::IllegalState(format!(
                "{} generator is not running ({:?})",
                self.label, self.state
            )));
        }
        self.state = GeneratorState::Stopped;

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = self.task.take().ok_or_else(|| {
            BusError::IllegalState(format!("{} generator task missing", self.label))
        })?;
        let mut connection = task.await.map_err(|e| {
            BusError::IllegalState(format!("{} generator task failed: {e}", self.label))
        })?;

        connection.disconnect().await?;
        info!(generator = self.label, "Generator stopped");
        Ok(())
    }
}

impl<H: CycleHook> Drop for PeriodicGenerator<H> {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn non_negative(field: &Field) -> BusResult<i64> {
    let value = field.value().as_i64().ok_or_else(|| {
        BusError::InvalidArgument(format!("{} must be an integer", field.name()))
    })?;
    if value < 0 || matches!(field.value(), FieldValue::F32(v) if *v < 0.0)
        || matches!(field.value(), FieldValue::F64(v) if *v < 0.0)
    {
        return Err(BusError::InvalidArgument(format!(
            "{} cannot be negative ({})",
            field.name(),
            field.value()
        )));
    }
    Ok(value)
}

async fn run_cycle<H: CycleHook>(
    label: &'static str,
    mut connection: Connection,
    schedule: Arc<Mutex<Schedule>>,
    mut hook: H,
    mut shutdown: oneshot::Receiver<()>,
) -> Connection {
    info!(generator = label, connection = connection.id(), "Generator started");

    let mut last_publish: Option<Instant> = None;
    let mut next_sample = hook.sample_interval().map(|interval| Instant::now() + interval);

    loop {
        // The first publication goes out before a stop request is honoured
        if last_publish.is_some()
            && !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        {
            break;
        }

        let now = Instant::now();
        let rate = schedule.lock().publish_rate;
        let due = match last_publish {
            None => Some(now),
            Some(last) if rate > 0 => Some(last + Duration::from_secs(u64::from(rate))),
            Some(_) => None,
        };

        if due.is_some_and(|due| due <= now) {
            let (mut message, sequence) = {
                let mut schedule = schedule.lock();
                let sequence = schedule.take_sequence();
                if let Err(e) = schedule.message.set_field_value(PUB_SEQ, sequence) {
                    error!(generator = label, error = %e, "Cannot update {PUB_SEQ}");
                }
                (schedule.message.clone(), sequence)
            };
            hook.before_publish(&mut message);

            match connection.publish(&message).await {
                Ok(()) => debug!(generator = label, sequence, "Published"),
                Err(e) => error!(generator = label, sequence, error = %e, "Publish failed"),
            }
            last_publish = Some(now);
            continue;
        }

        if next_sample.is_some_and(|at| at <= now) {
            hook.sample();
            next_sample = hook.sample_interval().map(|interval| now + interval);
            continue;
        }

        let mut wake = now + RATE_POLL;
        if let Some(due) = due {
            wake = wake.min(due);
        }
        if let Some(at) = next_sample {
            wake = wake.min(at);
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep_until(wake) => {}
        }
    }

    connection
}
