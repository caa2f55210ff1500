
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use clearnode_runtime::{Capabilities, SessionConfig};

pub const DEFAULT_URL: &str = "wss://clearnet.yellow.com/ws";
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const DEFAULT_COUNTERPARTY: &str = "0x000000000000000000000000000000000000dead";

/// Root CLI for clearnode.
#[derive(Parser, Debug)]
#[command(name = "clearnode")]
#[command(about = "ClearNode client - authenticate, query balances, open application sessions")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	#[command(subcommand)]
	pub command: Commands,
}

/// Where to connect and who to authenticate as.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
	/// Coordinator WebSocket endpoint.
	#[arg(long, global = true, env = "CLEARNODE_WS", default_value = DEFAULT_URL)]
	pub url: String,

	/// Hex-encoded 32-byte signing key.
	#[arg(long, global = true, env = "PRIVATE_KEY", hide_env_values = true)]
	pub private_key: Option<String>,

	/// Application name presented during authentication.
	#[arg(long, global = true, env = "APP_NAME", default_value = "demo-app.local")]
	pub app_name: String,

	/// Application contract address.
	#[arg(long, global = true, env = "APPLICATION_ADDRESS", default_value = ZERO_ADDRESS)]
	pub application: String,

	/// Session scope requested during authentication.
	#[arg(long, global = true, default_value = "console")]
	pub scope: String,

	/// Seconds to wait for the connection to open.
	#[arg(long, global = true, env = "CLEARNODE_CONNECT_TIMEOUT", default_value_t = 10)]
	pub connect_timeout: u64,

	/// Seconds to wait for each reply.
	#[arg(long, global = true, env = "CLEARNODE_REQUEST_TIMEOUT", default_value_t = 30)]
	pub request_timeout: u64,
}

impl ConnectionArgs {
	pub fn session_config(&self) -> SessionConfig {
		SessionConfig::default()
			.with_connect_timeout(Duration::from_secs(self.connect_timeout))
			.with_request_timeout(Duration::from_secs(self.request_timeout))
	}

	pub fn capabilities(&self) -> Capabilities {
		Capabilities::default()
			.with_scope(&self.scope)
			.with_application(&self.application)
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print off-chain ledger balances of the authenticated wallet.
	Balances,
	/// Open a two-party application session funded by the authenticated wallet.
	OpenSession(OpenSessionArgs),
	/// Send an authenticated request and print the reply.
	Call(CallArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OpenSessionArgs {
	/// Counterparty wallet address.
	#[arg(long, env = "COUNTERPARTY", default_value = DEFAULT_COUNTERPARTY)]
	pub counterparty: String,

	/// Amount allocated by the authenticated wallet.
	#[arg(long, default_value = "100")]
	pub amount: String,

	#[arg(long, default_value = "usdc")]
	pub asset: String,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
	/// Method tag, for example get_config.
	#[arg(value_name = "METHOD")]
	pub method: String,

	/// JSON params for the request.
	#[arg(long, value_name = "JSON", default_value = "{}")]
	pub params: String,
}
