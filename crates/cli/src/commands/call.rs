use anyhow::{Context, Result};
use clearnode_runtime::SessionOrchestrator;
use serde_json::Value;

use crate::cli::CallArgs;

pub async fn execute(session: &SessionOrchestrator, args: CallArgs) -> Result<Value> {
	let params: Value = serde_json::from_str(&args.params).context("--params is not valid JSON")?;
	let reply = session.request(args.method.as_str(), params).await?;
	Ok(reply)
}
