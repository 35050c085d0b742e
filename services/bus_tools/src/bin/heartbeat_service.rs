//! Heartbeat and resource publisher
//!
//! Usage:
//!   heartbeat_service mw-id=loopback component=MY-APP hb-rate=5 rsrc-rate=10
//!   heartbeat_service cfg-file=bus.xml cfg-name=ops duration=60
//!
//! Runs until Ctrl+C, or for `duration` seconds when given. With
//! `monitor=true` it also subscribes to its own traffic and logs each
//! message it sees, which is useful with the in-process loopback bus.

use anyhow::{Context, Result};
use bus_client::{Connection, HeartbeatGenerator, ResourceGenerator};
use bus_tools::{ensure_middleware, init_logging, standard_fields, Args};
use clap::Parser;
use config::Config;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn rate(config: &Config, key: &str, default: i64) -> Result<u16> {
    let value = config.get_integer_value(key, default);
    u16::try_from(value).with_context(|| format!("{key}={value} is out of range"))
}

async fn spawn_monitor(config: &Config) -> Result<JoinHandle<()>> {
    let mut connection = Connection::new(config);
    connection.connect().await?;
    connection.subscribe("C2MS.>").await?;

    Ok(tokio::spawn(async move {
        loop {
            match connection.receive(1000).await {
                Ok(Some(message)) => info!(
                    subject = message.subject(),
                    seq = ?message.integer_value("PUB-SEQ"),
                    "Observed"
                ),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Monitor stopped");
                    break;
                }
            }
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = args.config()?;
    ensure_middleware(&mut config);
    init_logging(&config);

    let fields = standard_fields(&config, "HEARTBEAT-SERVICE")?;
    let hb_rate = rate(&config, "hb-rate", 30)?;
    let rsrc_rate = rate(&config, "rsrc-rate", 60)?;
    let sample = rate(&config, "sample-interval", 1)?;
    let average = rate(&config, "average-interval", 10)?;

    let monitor = if config.get_boolean_value("monitor", false) {
        Some(spawn_monitor(&config).await?)
    } else {
        None
    };

    let mut heartbeat = HeartbeatGenerator::with_fields(&config, hb_rate, fields.clone())?;
    heartbeat.start().await.context("starting heartbeat generator")?;
    info!(rate = hb_rate, "Heartbeat generator running");

    let mut resource = if rsrc_rate > 0 {
        let mut generator = ResourceGenerator::with_source(
            &config,
            rsrc_rate,
            sample,
            average,
            bus_client::generator::sampler::SystemResourceSource::new(),
            fields,
        )?;
        generator.start().await.context("starting resource generator")?;
        info!(rate = rsrc_rate, sample, average, "Resource generator running");
        Some(generator)
    } else {
        None
    };

    let duration = config.get_integer_value("duration", 0);
    if duration > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration as u64)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("installing Ctrl+C handler")?;
    }
    info!("Shutting down");

    heartbeat.stop().await?;
    if let Some(generator) = resource.as_mut() {
        generator.stop().await?;
    }
    if let Some(monitor) = monitor {
        monitor.abort();
    }
    Ok(())
}
