//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bidi_protocol::{EventName, scope};
use bidi_runtime::{Connection, ConnectionConfig, RetryPolicy, WebSocketTransport};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::Events => {
			for event in EventName::ALL {
				println!("{}", event.as_str());
			}
			Ok(())
		}
		Commands::Call { method, params } => {
			let params = parse_params(params.as_deref())?;
			let (connection, run) = connect(&cli).await?;
			let result = connection.call::<Value>(method, params).await;
			shutdown(&connection, run).await;
			println!("{}", serde_json::to_string_pretty(&result?)?);
			Ok(())
		}
		Commands::Listen { events, context } => {
			let (connection, run) = connect(&cli).await?;
			let outcome = listen(&connection, events, context.as_deref()).await;
			shutdown(&connection, run).await;
			outcome
		}
	}
}

/// Environment settings with command-line overrides applied.
pub fn build_config(cli: &Cli) -> Result<ConnectionConfig> {
	apply_overrides(cli, ConnectionConfig::from_env()?)
}

/// Layers `--timeout-ms` and `--no-retry` over `config`.
pub fn apply_overrides(cli: &Cli, mut config: ConnectionConfig) -> Result<ConnectionConfig> {
	if let Some(ms) = cli.timeout_ms {
		if ms == 0 {
			bail!("--timeout-ms must be greater than zero");
		}
		config = config.with_command_timeout(Duration::from_millis(ms));
	}
	if cli.no_retry {
		config = config.with_retry(RetryPolicy::disabled());
	}
	Ok(config)
}

/// Parses the optional `PARAMS_JSON` argument; absent means `{}`.
pub fn parse_params(raw: Option<&str>) -> Result<Value> {
	let Some(raw) = raw else {
		return Ok(json!({}));
	};
	let params: Value = serde_json::from_str(raw).context("params are not valid JSON")?;
	if !params.is_object() {
		bail!("params must be a JSON object");
	}
	Ok(params)
}

/// One output line for a received event.
pub fn event_line(event: EventName, params: Value) -> Value {
	json!({
		"event": event.as_str(),
		"context": scope::context_id(event, &params),
		"params": params,
	})
}

async fn connect(cli: &Cli) -> Result<(Arc<Connection>, JoinHandle<()>)> {
	let Some(url) = cli.url.as_deref() else {
		bail!("no endpoint given: pass --url or set BIDI_URL");
	};
	let config = build_config(cli)?;

	let (transport, message_rx) = WebSocketTransport::connect(url).await?;
	info!(url, "connected");
	let connection = Arc::new(Connection::with_config(
		transport.into_transport_parts(message_rx),
		config,
	));
	let run = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.run().await }
	});
	Ok((connection, run))
}

async fn shutdown(connection: &Connection, run: JoinHandle<()>) {
	connection.close();
	if let Err(err) = run.await {
		warn!(error = %err, "connection task ended abnormally");
	}
	debug!(stats = ?connection.dispatcher_stats(), "closed");
}

async fn listen(connection: &Connection, events: &[EventName], context: Option<&str>) -> Result<()> {
	let (line_tx, mut line_rx) = mpsc::unbounded_channel();
	let mut handles = Vec::with_capacity(events.len());

	for &event in events {
		let (handle, mut rx) = connection
			.listen::<Value>(event, context)
			.await
			.with_context(|| format!("subscribing to {event}"))?;
		handles.push(handle);

		let line_tx = line_tx.clone();
		tokio::spawn(async move {
			while let Some(params) = rx.recv().await {
				if line_tx.send(event_line(event, params)).is_err() {
					break;
				}
			}
		});
	}
	drop(line_tx);
	info!(count = handles.len(), "listening");

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("interrupted");
				break;
			}
			line = line_rx.recv() => match line {
				Some(line) => println!("{line}"),
				None => {
					warn!("endpoint closed the connection");
					return Ok(());
				}
			}
		}
	}

	for handle in &handles {
		if let Err(err) = connection.remove_listener(handle).await {
			debug!(event = %handle.event(), error = %err, "unsubscribe failed");
		}
	}
	Ok(())
}
