//! Inbound HTTP surface: `POST /api/signup`.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router, extract::State};
use http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use crate::saga::{
	OrganizationRecord, Orchestrator, SagaOutcome, SignupRequest, SignupSuccess, UserRecord,
};

#[derive(Clone)]
struct AppState {
	orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
	Router::new()
		.route("/api/signup", post(signup))
		.with_state(AppState { orchestrator })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupResponse {
	organization: OrganizationRecord,
	user: UserRecord,
	role_assignment: Value,
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	details: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	message: Option<String>,
}

async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Response {
	// Request-shape precondition: a request missing any field makes zero
	// remote calls.
	let missing = request.missing_fields();
	if !missing.is_empty() {
		return (
			StatusCode::BAD_REQUEST,
			Json(ErrorBody {
				error: "Missing required fields".to_string(),
				details: Some(json!({ "missing": missing })),
				message: None,
			}),
		)
			.into_response();
	}

	match state.orchestrator.run(&request).await {
		SagaOutcome::Success(SignupSuccess {
			organization,
			user,
			role_assignment,
		}) => (
			StatusCode::CREATED,
			Json(SignupResponse {
				organization,
				user,
				role_assignment,
			}),
		)
			.into_response(),
		SagaOutcome::Failure(failure) => {
			let message = if failure.compensated {
				format!(
					"Sign up did not complete at step '{}'; the partially created organization was removed",
					failure.step
				)
			} else {
				format!("Sign up did not complete at step '{}'", failure.step)
			};
			(
				failure.status,
				Json(ErrorBody {
					error: failure.error,
					details: failure.details,
					message: Some(message),
				}),
			)
				.into_response()
		}
	}
}
