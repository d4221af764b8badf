//! Step executors: one typed async function per remote operation.
//!
//! Each executor takes exactly the context it needs (a token, an id, request
//! fields), performs one logical remote operation through [`IdentityApi`],
//! and returns a typed result. Expected remote rejections come back as
//! [`StepError`] values, never panics; transport faults are carried through
//! as the same failure class.

use std::time::Duration;

use http::StatusCode;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::provider::{ApiOutcome, IdentityApi, NewUser, OrgToken, ProviderError, RootToken};
use crate::saga::poll::{Attempt, poll_until_ready};
use crate::saga::{OrganizationRecord, SignupRequest, UserRecord};

/// Why a step failed. The orchestrator attaches the step name and decides
/// whether compensation runs.
#[derive(Debug, Error)]
pub enum StepError {
	/// The provider answered with a non-success status; status and body are
	/// passed through verbatim to the caller.
	#[error("{message}")]
	Rejected {
		message: String,
		status: StatusCode,
		details: Value,
	},
	/// A poll loop exhausted its deadline. Mapped to HTTP 408; no upstream
	/// detail exists.
	#[error("{message}")]
	Timeout { message: String },
	/// A listing returned zero matching results. Mapped to HTTP 404.
	#[error("{message}")]
	NotFound { message: String },
	/// The provider could not be reached at all. Mapped to HTTP 500.
	#[error("identity provider unreachable: {0}")]
	Transport(#[from] ProviderError),
}

impl StepError {
	fn rejected(message: impl Into<String>, outcome: &ApiOutcome) -> Self {
		StepError::Rejected {
			message: message.into(),
			status: outcome.status,
			details: outcome.body.clone(),
		}
	}

	pub fn status(&self) -> StatusCode {
		match self {
			StepError::Rejected { status, .. } => *status,
			StepError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
			StepError::NotFound { .. } => StatusCode::NOT_FOUND,
			StepError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn details(&self) -> Option<Value> {
		match self {
			StepError::Rejected { details, .. } if !details.is_null() => Some(details.clone()),
			_ => None,
		}
	}
}

pub async fn acquire_root_token(api: &dyn IdentityApi) -> Result<RootToken, StepError> {
	let outcome = api.issue_root_token().await?;
	if !outcome.ok() {
		return Err(StepError::rejected(
			"Failed to obtain a root access token",
			&outcome,
		));
	}
	match outcome.body["access_token"].as_str() {
		Some(token) => Ok(RootToken(SecretString::from(token.to_string()))),
		None => Err(StepError::Rejected {
			message: "Token response did not contain an access token".to_string(),
			status: StatusCode::BAD_GATEWAY,
			details: outcome.body,
		}),
	}
}

pub async fn validate_organization_name(
	api: &dyn IdentityApi,
	token: &RootToken,
	name: &str,
) -> Result<(), StepError> {
	let outcome = api.check_organization_name(token, name).await?;
	if !outcome.ok() {
		return Err(StepError::rejected(
			format!("Organization name '{name}' failed validation"),
			&outcome,
		));
	}
	if outcome.body["available"].as_bool() != Some(true) {
		return Err(StepError::Rejected {
			message: format!("Organization name '{name}' is not available"),
			status: StatusCode::CONFLICT,
			details: outcome.body,
		});
	}
	debug!(organization = %name, "organization name is available");
	Ok(())
}

pub async fn create_organization(
	api: &dyn IdentityApi,
	token: &RootToken,
	name: &str,
) -> Result<OrganizationRecord, StepError> {
	let outcome = api.create_organization(token, name).await?;
	if !outcome.ok() {
		return Err(StepError::rejected(
			"Failed to create the organization",
			&outcome,
		));
	}
	match outcome.body["id"].as_str() {
		Some(id) => Ok(OrganizationRecord {
			id: id.to_string(),
			name: name.to_string(),
			raw: outcome.body.clone(),
		}),
		None => Err(StepError::Rejected {
			message: "Organization response did not contain an id".to_string(),
			status: StatusCode::BAD_GATEWAY,
			details: outcome.body,
		}),
	}
}

pub async fn switch_organization(
	api: &dyn IdentityApi,
	token: &RootToken,
	organization: &OrganizationRecord,
) -> Result<OrgToken, StepError> {
	let outcome = api.switch_organization(token, &organization.id).await?;
	if !outcome.ok() {
		return Err(StepError::rejected(
			"Failed to switch to the new organization",
			&outcome,
		));
	}
	match outcome.body["access_token"].as_str() {
		Some(org_token) => Ok(OrgToken {
			organization_id: organization.id.clone(),
			token: SecretString::from(org_token.to_string()),
		}),
		None => Err(StepError::Rejected {
			message: "Failed to switch to the new organization".to_string(),
			status: StatusCode::BAD_GATEWAY,
			details: outcome.body,
		}),
	}
}

/// Waits until the organization's DEFAULT userstore shows up in the
/// userstore listing.
pub async fn wait_for_default_userstore(
	api: &dyn IdentityApi,
	token: &OrgToken,
	budget: Duration,
	interval: Duration,
) -> Result<(), StepError> {
	let outcome = poll_until_ready(budget, interval, || async move {
		match api.list_userstores(token).await {
			Ok(outcome) if outcome.ok() && has_default_userstore(&outcome.body) => {
				Attempt::Ready(())
			}
			Ok(outcome) if outcome.ok() => Attempt::Pending,
			Ok(outcome) => Attempt::Failed(format!(
				"userstore listing returned {}",
				outcome.status
			)),
			Err(err) => Attempt::Failed(err.to_string()),
		}
	})
	.await;

	if outcome.ready {
		debug!(attempts = outcome.attempts, "DEFAULT userstore is provisioned");
		Ok(())
	} else {
		Err(StepError::Timeout {
			message: "Timed out waiting for DEFAULT userstore to be provisioned".to_string(),
		})
	}
}

fn has_default_userstore(body: &Value) -> bool {
	body.as_array()
		.is_some_and(|stores| stores.iter().any(|s| s["name"] == "DEFAULT"))
}

/// Creates the admin user, retrying while dependent provisioning settles.
pub async fn create_admin_user(
	api: &dyn IdentityApi,
	token: &OrgToken,
	request: &SignupRequest,
	budget: Duration,
	interval: Duration,
) -> Result<UserRecord, StepError> {
	let user = NewUser {
		first_name: &request.first_name,
		last_name: &request.last_name,
		email: &request.email,
		password: &request.password,
	};
	let user = &user;
	let outcome = poll_until_ready(budget, interval, || async move {
		match api.create_user(token, user).await {
			Ok(outcome) if outcome.ok() => match outcome.body["id"].as_str() {
				Some(id) => Attempt::Ready(UserRecord {
					id: id.to_string(),
					raw: outcome.body.clone(),
				}),
				None => Attempt::Failed("user response did not contain an id".to_string()),
			},
			Ok(outcome) => Attempt::Failed(format!("user creation returned {}", outcome.status)),
			Err(err) => Attempt::Failed(err.to_string()),
		}
	})
	.await;

	match outcome.last {
		Some(user) if outcome.ready => Ok(user),
		_ => Err(StepError::Timeout {
			message: "Timed out creating the admin user".to_string(),
		}),
	}
}

/// Finds the application named `app_name` within the organization.
pub async fn find_application(
	api: &dyn IdentityApi,
	token: &OrgToken,
	app_name: &str,
) -> Result<String, StepError> {
	let outcome = api.list_applications(token, app_name).await?;
	if !outcome.ok() {
		return Err(StepError::rejected("Failed to list applications", &outcome));
	}
	let found = outcome.body["applications"]
		.as_array()
		.and_then(|apps| apps.iter().find(|app| app["name"] == app_name))
		.and_then(|app| app["id"].as_str());
	match found {
		Some(id) => Ok(id.to_string()),
		None => Err(StepError::NotFound {
			message: format!("Sign up failed. Application '{app_name}' not found"),
		}),
	}
}

/// Resolves the admin role whose audience is the application and whose name
/// matches the configured admin role name.
pub async fn resolve_admin_role(
	api: &dyn IdentityApi,
	token: &OrgToken,
	application_id: &str,
	role_name: &str,
) -> Result<String, StepError> {
	let outcome = api.list_roles(token, application_id, role_name).await?;
	if !outcome.ok() {
		return Err(StepError::rejected("Failed to list roles", &outcome));
	}
	let found = outcome.body["Resources"]
		.as_array()
		.and_then(|roles| roles.iter().find(|role| role["displayName"] == role_name))
		.and_then(|role| role["id"].as_str());
	match found {
		Some(id) => Ok(id.to_string()),
		None => Err(StepError::NotFound {
			message: format!("Sign up failed. Admin role '{role_name}' not found"),
		}),
	}
}

/// Assigns the user to the role, retrying until the provider reports an "ok"
/// completion. A nominally successful patch with a non-"ok" status field is
/// not an assignment.
pub async fn assign_admin_role(
	api: &dyn IdentityApi,
	token: &OrgToken,
	role_id: &str,
	user_id: &str,
	budget: Duration,
	interval: Duration,
) -> Result<Value, StepError> {
	let outcome = poll_until_ready(budget, interval, || async move {
		match api.assign_role(token, role_id, user_id).await {
			Ok(outcome) if outcome.ok() && assignment_completed(&outcome.body) => {
				Attempt::Ready(outcome.body.clone())
			}
			Ok(outcome) => Attempt::Failed(format!(
				"role assignment returned {} with status {}",
				outcome.status, outcome.body["status"]
			)),
			Err(err) => Attempt::Failed(err.to_string()),
		}
	})
	.await;

	match outcome.last {
		Some(assignment) if outcome.ready => Ok(assignment),
		_ => Err(StepError::Timeout {
			message: "Timed out assigning the admin user to the role".to_string(),
		}),
	}
}

// Providers that report assignment completion do so via a "status" field; its
// absence on a 2xx means the patch itself is the confirmation.
fn assignment_completed(body: &Value) -> bool {
	match body["status"].as_str() {
		Some(status) => status.eq_ignore_ascii_case("ok"),
		None => true,
	}
}
