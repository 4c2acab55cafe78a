//! Session handlers: login, logout, listUsers.
//!
//! Taken usernames and unknown sessions are business outcomes carried in
//! `result.status`; only an invalid caller on `listUsers` and a full session
//! registry are RPC errors.

use async_trait::async_trait;
use metrics::gauge;
use serde_json::{Value, json};
use tracing::instrument;

use crate::metrics::SESSIONS_ACTIVE;
use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::handlers::require_string_param;
use crate::rpc::registry::MethodHandler;
use crate::rpc::validation::{MAX_TOKEN_LENGTH, validate_string_param, validate_username};

/// Publish the current session count.
#[allow(clippy::cast_precision_loss)]
fn record_sessions(ctx: &RpcContext) {
    gauge!(SESSIONS_ACTIVE).set(ctx.service.sessions().len() as f64);
}

/// Read and validate `username` and `token`.
fn credentials(params: Option<&Value>, ctx: &RpcContext) -> Result<(String, String), RpcError> {
    let username = require_string_param(params, "username")?;
    validate_username(&username, ctx.max_username_len)?;
    let token = require_string_param(params, "token")?;
    validate_string_param(&token, "token", MAX_TOKEN_LENGTH)?;
    Ok((username, token))
}

/// Start a session for a username.
pub struct LoginHandler;

#[async_trait]
impl MethodHandler for LoginHandler {
    #[instrument(skip(self, ctx), fields(method = "session.login"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let username = require_string_param(params.as_ref(), "username")?;
        validate_username(&username, ctx.max_username_len)?;

        let outcome = ctx.service.login(&username)?;
        record_sessions(ctx);

        let mut result = json!({ "status": outcome.status() });
        if let Some(token) = outcome.token() {
            result["token"] = json!(token);
        }
        Ok(result)
    }
}

/// End a session.
pub struct LogoutHandler;

#[async_trait]
impl MethodHandler for LogoutHandler {
    #[instrument(skip(self, params, ctx), fields(method = "session.logout"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let (username, token) = credentials(params.as_ref(), ctx)?;

        let outcome = ctx.service.logout(&username, &token);
        record_sessions(ctx);

        let mut result = json!({ "status": outcome.status() });
        if let relay_runtime::LogoutOutcome::Ok { stream_closed } = outcome {
            result["streamClosed"] = json!(stream_closed);
        }
        Ok(result)
    }
}

/// Roster of logged-in usernames, for a logged-in caller.
pub struct ListUsersHandler;

#[async_trait]
impl MethodHandler for ListUsersHandler {
    #[instrument(skip(self, params, ctx), fields(method = "session.listUsers"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let (username, token) = credentials(params.as_ref(), ctx)?;
        let users = ctx.service.list_users(&username, &token)?;
        Ok(json!({ "users": users }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::errors::{MAX_SESSIONS_REACHED, PERMISSION_DENIED};
    use crate::rpc::handlers::test_helpers::{make_test_context, make_test_context_with_limit};
    use assert_matches::assert_matches;

    async fn login(ctx: &RpcContext, username: &str) -> Value {
        LoginHandler
            .handle(Some(json!({ "username": username })), ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_returns_token() {
        let ctx = make_test_context();
        let result = login(&ctx, "alice").await;
        assert_eq!(result["status"], "OK");
        let token = result["token"].as_str().unwrap();
        assert!(ctx.service.sessions().validate("alice", token));
    }

    #[tokio::test]
    async fn second_login_fails_without_token() {
        let ctx = make_test_context();
        let _ = login(&ctx, "alice").await;
        let result = login(&ctx, "alice").await;
        assert_eq!(result["status"], "FAILED");
        assert!(result.get("token").is_none());
    }

    #[tokio::test]
    async fn login_missing_username() {
        let ctx = make_test_context();
        let err = LoginHandler.handle(Some(json!({})), &ctx).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn login_rejects_empty_and_long_usernames() {
        let ctx = make_test_context();
        let err = LoginHandler
            .handle(Some(json!({ "username": "" })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");

        let long = "u".repeat(65);
        let err = LoginHandler
            .handle(Some(json!({ "username": long })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
        assert!(ctx.service.sessions().is_empty());
    }

    #[tokio::test]
    async fn login_at_capacity_is_an_error() {
        let ctx = make_test_context_with_limit(1);
        let _ = login(&ctx, "alice").await;
        let err = LoginHandler
            .handle(Some(json!({ "username": "bob" })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), MAX_SESSIONS_REACHED);
    }

    #[tokio::test]
    async fn logout_scenario() {
        let ctx = make_test_context();
        let token = login(&ctx, "alice").await["token"].as_str().unwrap().to_owned();

        let wrong = LogoutHandler
            .handle(Some(json!({ "username": "alice", "token": "wrong-token" })), &ctx)
            .await
            .unwrap();
        assert_eq!(wrong["status"], "FAILED");
        assert!(wrong.get("streamClosed").is_none());
        assert!(ctx.service.sessions().validate("alice", &token));

        let ok = LogoutHandler
            .handle(Some(json!({ "username": "alice", "token": token })), &ctx)
            .await
            .unwrap();
        assert_eq!(ok["status"], "OK");
        assert_eq!(ok["streamClosed"], false);

        let err = ListUsersHandler
            .handle(Some(json!({ "username": "alice", "token": token })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn logout_missing_token() {
        let ctx = make_test_context();
        let err = LogoutHandler
            .handle(Some(json!({ "username": "alice" })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn list_users_sorted() {
        let ctx = make_test_context();
        let _ = login(&ctx, "carol").await;
        let token = login(&ctx, "alice").await["token"].as_str().unwrap().to_owned();
        let _ = login(&ctx, "bob").await;

        let result = ListUsersHandler
            .handle(Some(json!({ "username": "alice", "token": token })), &ctx)
            .await
            .unwrap();
        assert_eq!(result["users"], json!(["alice", "bob", "carol"]));
    }

    #[tokio::test]
    async fn list_users_with_another_users_token() {
        let ctx = make_test_context();
        let _ = login(&ctx, "alice").await;
        let bob_token = login(&ctx, "bob").await["token"].as_str().unwrap().to_owned();

        let result = ListUsersHandler
            .handle(Some(json!({ "username": "alice", "token": bob_token })), &ctx)
            .await;
        assert_matches!(result, Err(RpcError::PermissionDenied { .. }));
    }
}
