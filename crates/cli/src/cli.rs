use clap::{Parser, Subcommand};

use bidi_protocol::EventName;

use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "bidi")]
#[command(about = "Send commands to and watch events from a BiDi endpoint")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// WebSocket URL of the endpoint
	#[arg(long, global = true, env = "BIDI_URL", value_name = "WS_URL")]
	pub url: Option<String>,

	/// Command timeout in milliseconds (overrides BIDI_COMMAND_TIMEOUT_MS)
	#[arg(long, global = true, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	/// Fail commands on the first error frame instead of retrying
	#[arg(long, global = true)]
	pub no_retry: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Send one command and print its result as JSON
	Call {
		/// Method name, e.g. browsingContext.getTree
		method: String,
		/// Parameters as a JSON object
		#[arg(value_name = "PARAMS_JSON")]
		params: Option<String>,
	},

	/// Print events as JSON lines until interrupted
	#[command(alias = "watch")]
	Listen {
		/// Event names, e.g. log.entryAdded
		#[arg(required = true, num_args = 1..)]
		events: Vec<EventName>,
		/// Only deliver events for this browsing context
		#[arg(long, value_name = "ID")]
		context: Option<String>,
	},

	/// List the event names `listen` accepts
	Events,
}
