use anyhow::{Context, Result};
use clearnode_protocol::{AppDefinition, Allocation, now_millis};
use clearnode_runtime::SessionOrchestrator;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::OpenSessionArgs;

pub async fn execute(session: &SessionOrchestrator, address: &str, args: OpenSessionArgs) -> Result<Value> {
	let balances = session.get_ledger_balances(address).await.context("failed to read balances")?;
	info!(count = balances.len(), "ledger balances");

	let definition = AppDefinition::two_party(address, &args.counterparty, now_millis());
	let allocations = vec![
		Allocation::new(address, &args.asset, &args.amount),
		Allocation::new(&args.counterparty, &args.asset, "0"),
	];

	let app_session = session
		.create_app_session(definition, allocations)
		.await
		.context("failed to create app session")?;
	info!(id = %app_session.app_session_id, "app session created");

	Ok(json!({
		"balances": balances,
		"app_session": app_session,
	}))
}
