//! Request/reply round trip over one bus
//!
//! Usage:
//!   request_reply directive=STATUS count=3 timeout-ms=2000
//!
//! Starts a responder for `DESTINATION-COMPONENT=responder` (default
//! `RESPONDER`) and sends `count` directive requests to it, logging each
//! reply. Exits non-zero if any request goes unanswered.

use anyhow::{bail, Result};
use bus_client::request::REQUEST_ID;
use bus_client::{Connection, ResponseStatus};
use bus_tools::{ensure_middleware, init_logging, standard_fields, Args};
use clap::Parser;
use config::Config;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use types::{Field, MessageKind};

async fn connect(config: &Config, component: &str) -> Result<Connection> {
    let mut connection = Connection::new(config);
    connection
        .message_factory_mut()
        .set_standard_fields(standard_fields(config, component)?);
    connection.connect().await?;
    Ok(connection)
}

async fn spawn_responder(
    config: &Config,
    component: String,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<JoinHandle<Result<()>>> {
    let mut connection = Connection::new(config);
    let mut fields = standard_fields(config, &component)?;
    fields.retain(|f| f.name() != "COMPONENT");
    fields.push(Field::header("COMPONENT", component.as_str())?);
    connection.message_factory_mut().set_standard_fields(fields);
    connection.connect().await?;
    connection
        .subscribe(&format!("C2MS.*.*.*.*.*.*.REQ.DIR.{component}"))
        .await?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = connection.receive(500) => received?,
            };
            let Some(request) = received else { continue };
            if request.kind() != MessageKind::Request {
                continue;
            }

            let directive = request.string_value("DIRECTIVE-STRING").unwrap_or_default();
            info!(
                request_id = ?request.string_value(REQUEST_ID),
                directive = %directive,
                "Handling directive"
            );

            let mut reply = connection.message_factory().create_message("RESP.DIR")?;
            reply.add_field(Field::new("DATA", format!("ACK {directive}"))?);
            reply.add_field(Field::new(
                "RESPONSE-STATUS",
                ResponseStatus::SuccessfulCompletion.code(),
            )?);
            connection.reply(&request, &reply).await?;
        }
        connection.disconnect().await?;
        Ok::<(), anyhow::Error>(())
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = args.config()?;
    ensure_middleware(&mut config);
    init_logging(&config);

    let responder_name = config.get_value("responder", "RESPONDER").to_ascii_uppercase();
    let directive = config.get_value("directive", "PING").to_string();
    let count = config.get_integer_value("count", 1).max(1);
    let timeout_ms = i32::try_from(config.get_integer_value("timeout-ms", 5000)).unwrap_or(i32::MAX);

    let (stop_tx, stop_rx) = oneshot::channel();
    let responder = spawn_responder(&config, responder_name.clone(), stop_rx).await?;
    let mut requester = connect(&config, "REQUESTER").await?;

    let mut unanswered = 0;
    for attempt in 1..=count {
        let mut request = requester.message_factory().create_message("REQ.DIR")?;
        request.add_field(Field::new("DESTINATION-COMPONENT", responder_name.as_str())?);
        request.add_field(Field::new("DIRECTIVE-STRING", directive.as_str())?);

        match requester.request(&request, timeout_ms).await? {
            Some(reply) => info!(
                attempt,
                status = ?reply.integer_value("RESPONSE-STATUS"),
                data = ?reply.string_value("DATA"),
                "Reply received"
            ),
            None => {
                error!(attempt, timeout_ms, "No reply");
                unanswered += 1;
            }
        }
    }

    let _ = stop_tx.send(());
    responder.await??;
    requester.disconnect().await?;

    if unanswered > 0 {
        bail!("{unanswered} of {count} requests went unanswered");
    }
    Ok(())
}
