use std::sync::Arc;

use clap::Parser;
use clearnode_cli::{cli::Cli, commands, logging};
use clearnode_runtime::WebSocketConnector;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match commands::dispatch(cli, Arc::new(WebSocketConnector)).await {
		Ok(output) => match serde_json::to_string_pretty(&output) {
			Ok(rendered) => println!("{rendered}"),
			Err(err) => {
				eprintln!("error: {err}");
				std::process::exit(1);
			}
		},
		Err(err) => {
			eprintln!("error: {err:#}");
			std::process::exit(1);
		}
	}
}
