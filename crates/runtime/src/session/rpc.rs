//! Typed wrappers over [`SessionOrchestrator::request`].

use std::time::Duration;

use clearnode_protocol::ledger::{balances_params, parse_balances};
use clearnode_protocol::{
	AppDefinition, AppSessionInfo, Allocation, CloseAppSessionParams, CreateAppSessionParams, LedgerBalance, RpcMethod,
};
use serde_json::{Value, json};
use tokio::time::Instant;

use super::SessionOrchestrator;
use crate::error::Result;

impl SessionOrchestrator {
	/// Off-chain ledger balances of `participant`.
	pub async fn get_ledger_balances(&self, participant: &str) -> Result<Vec<LedgerBalance>> {
		let reply = self.request(RpcMethod::GetLedgerBalances, balances_params(participant)).await?;
		Ok(parse_balances(&reply)?)
	}

	/// Opens an application session with the given initial allocations.
	pub async fn create_app_session(&self, definition: AppDefinition, allocations: Vec<Allocation>) -> Result<AppSessionInfo> {
		let params = CreateAppSessionParams { definition, allocations }.to_params()?;
		let reply = self.request(RpcMethod::CreateAppSession, params).await?;
		Ok(serde_json::from_value(reply)?)
	}

	/// Closes an application session, settling it to `allocations`.
	pub async fn close_app_session(&self, app_session_id: &str, allocations: Vec<Allocation>) -> Result<AppSessionInfo> {
		let params = CloseAppSessionParams {
			app_session_id: app_session_id.to_string(),
			allocations,
		}
		.to_params()?;
		let reply = self.request(RpcMethod::CloseAppSession, params).await?;
		Ok(serde_json::from_value(reply)?)
	}

	/// Coordinator configuration (supported networks, broker address).
	pub async fn get_config(&self) -> Result<Value> {
		self.request(RpcMethod::GetConfig, json!({})).await
	}

	/// Round-trip time of a `ping`.
	pub async fn ping(&self) -> Result<Duration> {
		let started = Instant::now();
		self.request(RpcMethod::Ping, json!({})).await?;
		Ok(started.elapsed())
	}
}
