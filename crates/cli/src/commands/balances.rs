use anyhow::Result;
use clearnode_runtime::SessionOrchestrator;
use serde_json::Value;

pub async fn execute(session: &SessionOrchestrator, address: &str) -> Result<Value> {
	let balances = session.get_ledger_balances(address).await?;
	Ok(serde_json::to_value(balances)?)
}
