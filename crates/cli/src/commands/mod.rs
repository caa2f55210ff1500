mod balances;
mod call;
mod open_session;

use std::sync::Arc;

use anyhow::{Context, Result};
use clearnode_runtime::{Connector, Identity, SessionOrchestrator, Signer};
use serde_json::Value;
use tracing::info;

use crate::cli::{Cli, Commands, ConnectionArgs};
use crate::signer::KeySigner;

/// Runs `cli.command` against a fresh session and returns its JSON output.
///
/// The session is closed before returning, on success and on failure.
pub async fn dispatch(cli: Cli, connector: Arc<dyn Connector>) -> Result<Value> {
	let Cli { connection, command, .. } = cli;

	let secret = connection
		.private_key
		.as_deref()
		.context("no signing key: set PRIVATE_KEY or pass --private-key")?;
	let signer = Arc::new(KeySigner::from_hex(secret).context("invalid private key")?);
	let identity = Identity::new(signer.address(), &connection.app_name);

	let session = SessionOrchestrator::new(connector, signer, connection.session_config());
	let result = run(&session, &connection, &identity, command).await;
	session.close().await;
	result
}

async fn run(session: &SessionOrchestrator, connection: &ConnectionArgs, identity: &Identity, command: Commands) -> Result<Value> {
	info!(url = %connection.url, "connecting to ClearNode");
	session
		.connect(&connection.url)
		.await
		.with_context(|| format!("failed to connect to {}", connection.url))?;

	let auth = session
		.authenticate(identity, &connection.capabilities())
		.await
		.context("authentication failed")?;
	info!(address = %auth.address, "session authenticated");

	match command {
		Commands::Balances => balances::execute(session, &auth.address).await,
		Commands::OpenSession(args) => open_session::execute(session, &auth.address, args).await,
		Commands::Call(args) => call::execute(session, args).await,
	}
}
