// Integration tests for the authentication handshake
//
// Tests cover:
// - requests refused before authentication
// - successful and rejected handshakes, and retry after rejection
// - error frames and timeouts during the handshake
// - overlapping authenticate() calls
// - late replies to an earlier attempt, abandoned attempts
// - close() and hang-up while a handshake is in flight

mod coordinator;

use std::time::Duration;

use clearnode_runtime::protocol::now_millis;
use clearnode_runtime::{AuthPhase, Capabilities, ConnectionState, Error, SessionConfig, Signer};
use coordinator::{authenticated, connected, identity};
use serde_json::json;

#[tokio::test]
async fn test_request_before_authentication_sends_nothing() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let err = session.request("get_config", json!({})).await.unwrap_err();
	assert!(matches!(err, Error::NotAuthenticated), "got {err:?}");
	assert!(coordinator.peer.try_recv().is_none());
	assert_eq!(session.pending_calls(), 0);

	session.close().await;
}

#[tokio::test]
async fn test_successful_handshake_verifies_session() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;
	assert_eq!(session.auth_phase(), AuthPhase::Idle);

	let capabilities = Capabilities::default().with_allowance("usdc", "10");
	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &capabilities).await }, async {
		let request = coordinator.next_request().await;
		assert_eq!(request.method, "auth_request");
		assert!(request.signatures.is_empty(), "auth_request goes out unsigned");
		assert_eq!(request.params["address"], coordinator::WALLET);
		assert_eq!(request.params["app_name"], "clearnode-tests");
		assert_eq!(request.params["allowances"], json!([{"asset": "usdc", "amount": "10"}]));
		coordinator.reply(request.id, "auth_challenge", json!({ "nonce": "abc" }));

		let verify = coordinator.next_request().await;
		assert_eq!(verify.params["challenge"], "abc");
		coordinator.reply(verify.id, "auth_verify", json!({ "success": true, "jwtToken": "jwt-1" }));
	});

	let auth = auth.expect("handshake should succeed");
	assert_eq!(auth.address, coordinator::WALLET);
	assert_eq!(auth.jwt_token.as_deref(), Some("jwt-1"));
	assert_eq!(session.auth_phase(), AuthPhase::Verified);

	session.close().await;
}

#[tokio::test]
async fn test_rejected_handshake_can_be_retried() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(
		async { session.authenticate(&identity(), &Capabilities::default()).await },
		coordinator.run_handshake(json!({ "success": false, "reason": "bad-sig" }))
	);
	let err = auth.unwrap_err();
	assert_eq!(err.auth_reason(), Some("bad-sig"));
	assert_eq!(session.auth_phase(), AuthPhase::Failed);

	let err = session.request("ping", json!({})).await.unwrap_err();
	assert!(matches!(err, Error::NotAuthenticated));

	let (auth, ()) = tokio::join!(
		async { session.authenticate(&identity(), &Capabilities::default()).await },
		coordinator.run_handshake(json!({ "success": true }))
	);
	auth.expect("retry should succeed");
	assert_eq!(session.auth_phase(), AuthPhase::Verified);

	session.close().await;
}

#[tokio::test]
async fn test_error_frame_during_handshake_is_protocol_error() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		coordinator.reply(request.id, "error", json!({ "error": "unknown wallet" }));
	});

	match auth.unwrap_err() {
		Error::Protocol(message) => assert!(message.contains("unknown wallet"), "got {message}"),
		other => panic!("Expected Protocol error, got: {other:?}"),
	}
	assert_eq!(session.auth_phase(), AuthPhase::Failed);

	session.close().await;
}

#[tokio::test]
async fn test_challenge_without_nonce_is_protocol_error() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		coordinator.reply(request.id, "auth_challenge", json!({ "unexpected": true }));
	});

	assert!(matches!(auth.unwrap_err(), Error::Protocol(_)));
	session.close().await;
}

#[tokio::test]
async fn test_overlapping_authenticate_is_rejected() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;
	let identity = identity();
	let capabilities = Capabilities::default();

	let (first, second, ()) = tokio::join!(
		session.authenticate(&identity, &capabilities),
		async {
			tokio::task::yield_now().await;
			session.authenticate(&identity, &capabilities).await
		},
		coordinator.run_handshake(json!({ "success": true }))
	);

	first.expect("first handshake should succeed");
	assert!(matches!(second.unwrap_err(), Error::InvalidState(_)));
	assert_eq!(session.auth_phase(), AuthPhase::Verified);

	session.close().await;
}

#[tokio::test]
async fn test_authenticate_requires_open_connection() {
	let (session, _coordinator) = connected(SessionConfig::default()).await;
	session.close().await;

	let err = session.authenticate(&identity(), &Capabilities::default()).await.unwrap_err();
	assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test(start_paused = true)]
async fn test_silent_coordinator_times_out_handshake() {
	let config = SessionConfig::default().with_handshake_timeout(Duration::from_secs(2));
	let (session, mut coordinator) = connected(config).await;

	let err = session.authenticate(&identity(), &Capabilities::default()).await.unwrap_err();
	assert!(err.is_timeout(), "got {err:?}");
	assert_eq!(session.auth_phase(), AuthPhase::Failed);
	assert_eq!(coordinator.next_request().await.method, "auth_request");

	session.close().await;
}

#[tokio::test]
async fn test_reconnect_requires_new_handshake() {
	let (session, _coordinator) = authenticated(SessionConfig::default()).await;
	session.close().await;
	assert_eq!(session.auth_phase(), AuthPhase::Idle);

	let err = session.request("ping", json!({})).await.unwrap_err();
	assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn test_auth_request_carries_session_key_and_expiry() {
	let config = SessionConfig::default().with_auth_expiry(Duration::from_secs(600));
	let (session, mut coordinator) = connected(config).await;
	assert_eq!(session.config().auth_expiry, Duration::from_secs(600));
	assert_eq!(session.signer().address(), coordinator::WALLET);

	let session_key = "0x00000000000000000000000000000000000000cc";
	let identity = identity().with_session_key(session_key);
	let (auth, ()) = tokio::join!(async { session.authenticate(&identity, &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		assert_eq!(request.params["address"], coordinator::WALLET);
		assert_eq!(request.params["session_key"], session_key);
		let expire = request.params["expire"].as_u64().expect("expire is a number");
		let now = now_millis() / 1000;
		assert!((now + 590..=now + 610).contains(&expire), "expire {expire} not ~600s after {now}");
		coordinator.reply(request.id, "auth_challenge", json!({ "challenge": "abc" }));

		let verify = coordinator.next_request().await;
		coordinator.reply(verify.id, "auth_verify", json!({ "success": true }));
	});

	let auth = auth.expect("handshake should succeed");
	assert_eq!(auth.session_key, session_key);
	assert!(auth.expires_at >= now_millis() / 1000 + 590);

	session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_verdict_from_timed_out_attempt_is_ignored() {
	let config = SessionConfig::default().with_handshake_timeout(Duration::from_secs(2));
	let (session, mut coordinator) = connected(config).await;

	let (first, stale_verify_id) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		coordinator.reply(request.id, "auth_challenge", json!({ "challenge_message": "abc" }));
		coordinator.next_request().await.id
	});
	assert!(first.unwrap_err().is_timeout());

	let (second, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		assert_eq!(request.method, "auth_request");
		coordinator.reply(stale_verify_id, "auth_verify", json!({ "success": false, "reason": "expired" }));
		coordinator.reply(request.id, "auth_challenge", json!({ "challenge_message": "def" }));

		let verify = coordinator.next_request().await;
		assert_eq!(verify.params["challenge"], "def");
		coordinator.reply(verify.id, "auth_verify", json!({ "success": true }));
	});

	second.expect("retry should not see the earlier verdict");
	assert_eq!(session.auth_phase(), AuthPhase::Verified);

	session.close().await;
}

#[tokio::test]
async fn test_verdict_for_another_request_does_not_verify() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		let request = coordinator.next_request().await;
		coordinator.reply(request.id, "auth_challenge", json!({ "challenge_message": "abc" }));

		let verify = coordinator.next_request().await;
		coordinator.reply(verify.id + 50, "auth_verify", json!({ "success": true }));
		coordinator.reply(verify.id, "auth_verify", json!({ "success": false, "reason": "bad-sig" }));
	});

	assert_eq!(auth.unwrap_err().auth_reason(), Some("bad-sig"));
	assert_eq!(session.auth_phase(), AuthPhase::Failed);

	session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_authenticate_can_be_retried() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let abandoned = tokio::time::timeout(
		Duration::from_millis(100),
		session.authenticate(&identity(), &Capabilities::default()),
	)
	.await;
	assert!(abandoned.is_err());
	assert_eq!(session.auth_phase(), AuthPhase::Failed);
	assert_eq!(coordinator.next_request().await.method, "auth_request");

	let (auth, ()) = tokio::join!(
		async { session.authenticate(&identity(), &Capabilities::default()).await },
		coordinator.run_handshake(json!({ "success": true }))
	);
	auth.expect("retry after an abandoned attempt");
	assert_eq!(session.auth_phase(), AuthPhase::Verified);

	session.close().await;
}

#[tokio::test]
async fn test_close_during_handshake_is_cancelled() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		coordinator.next_request().await;
		session.close().await;
	});

	assert!(auth.unwrap_err().is_cancelled());
	assert_eq!(session.auth_phase(), AuthPhase::Idle);
	assert_eq!(session.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_hang_up_during_handshake_is_transport_error() {
	let (session, mut coordinator) = connected(SessionConfig::default()).await;

	let (auth, ()) = tokio::join!(async { session.authenticate(&identity(), &Capabilities::default()).await }, async {
		coordinator.next_request().await;
		coordinator.peer.disconnect();
	});

	assert!(matches!(auth.unwrap_err(), Error::Transport(_)));
	assert_eq!(session.auth_phase(), AuthPhase::Idle);
	assert_eq!(session.connection_state(), ConnectionState::Closed);
}
