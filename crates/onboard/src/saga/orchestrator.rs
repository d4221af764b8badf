//! Saga orchestrator: sequences the step executors, carries context between
//! them, and decides when compensation runs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

use crate::provider::{IdentityApi, RootToken};
use crate::saga::compensate::Compensator;
use crate::saga::steps::{self, StepError};
use crate::saga::{OrganizationRecord, SignupRequest, UserRecord};

/// Name of the saga step a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
	RootToken,
	ValidateName,
	CreateOrganization,
	SwitchOrganization,
	WaitUserstore,
	CreateUser,
	FindApplication,
	ResolveRole,
	AssignRole,
}

impl Step {
	pub fn as_str(&self) -> &'static str {
		match self {
			Step::RootToken => "acquire-root-token",
			Step::ValidateName => "validate-organization-name",
			Step::CreateOrganization => "create-organization",
			Step::SwitchOrganization => "switch-organization",
			Step::WaitUserstore => "wait-default-userstore",
			Step::CreateUser => "create-admin-user",
			Step::FindApplication => "find-application",
			Step::ResolveRole => "resolve-admin-role",
			Step::AssignRole => "assign-admin-role",
		}
	}
}

impl fmt::Display for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct SignupSuccess {
	pub organization: OrganizationRecord,
	pub user: UserRecord,
	pub role_assignment: Value,
}

/// Terminal failure of a run. `compensated` is true only when compensation
/// was attempted and the provider confirmed the deletion; false does not
/// imply no remote organization exists.
#[derive(Debug)]
pub struct SagaFailure {
	pub step: Step,
	pub status: StatusCode,
	pub error: String,
	pub details: Option<Value>,
	pub compensated: bool,
}

#[derive(Debug)]
pub enum SagaOutcome {
	Success(SignupSuccess),
	Failure(SagaFailure),
}

pub struct Orchestrator {
	api: Arc<dyn IdentityApi>,
	compensator: Compensator,
	admin_role: String,
	poll_budget: Duration,
	poll_interval: Duration,
}

impl Orchestrator {
	pub fn new(
		api: Arc<dyn IdentityApi>,
		admin_role: String,
		poll_budget: Duration,
		poll_interval: Duration,
	) -> Self {
		let compensator = Compensator::new(api.clone());
		Self {
			api,
			compensator,
			admin_role,
			poll_budget,
			poll_interval,
		}
	}

	/// Runs the saga to a single terminal outcome. Never returns a failure
	/// after organization creation without having attempted compensation.
	pub async fn run(&self, request: &SignupRequest) -> SagaOutcome {
		info!(
			organization = %request.organization_name,
			app = %request.app_name,
			"starting signup saga"
		);

		// Steps up to and including organization creation fail terminally
		// with no compensation: nothing remote exists yet.
		let root = match steps::acquire_root_token(self.api.as_ref()).await {
			Ok(root) => root,
			Err(err) => return failure(Step::RootToken, err, false),
		};
		if let Err(err) =
			steps::validate_organization_name(self.api.as_ref(), &root, &request.organization_name)
				.await
		{
			return failure(Step::ValidateName, err, false);
		}
		let organization = match steps::create_organization(
			self.api.as_ref(),
			&root,
			&request.organization_name,
		)
		.await
		{
			Ok(organization) => organization,
			Err(err) => return failure(Step::CreateOrganization, err, false),
		};

		info!(
			organization_id = %organization.id,
			"organization created; failures from here on are compensated"
		);

		// From here the organization exists remotely. All remaining steps run
		// inside `provision`, whose single failure exit below is the only
		// place compensation is invoked.
		match self.provision(&root, &organization, request).await {
			Ok((user, role_assignment)) => {
				info!(
					organization_id = %organization.id,
					user_id = %user.id,
					"signup saga completed"
				);
				SagaOutcome::Success(SignupSuccess {
					organization,
					user,
					role_assignment,
				})
			}
			Err((step, err)) => {
				let compensated = self
					.compensator
					.delete_organization(&root, &organization.id)
					.await;
				failure(step, err, compensated)
			}
		}
	}

	/// Per-tenant provisioning, entered only once the organization exists.
	/// A failure return carries the step it happened in; the caller owns the
	/// organization record and compensates.
	async fn provision(
		&self,
		root: &RootToken,
		organization: &OrganizationRecord,
		request: &SignupRequest,
	) -> Result<(UserRecord, Value), (Step, StepError)> {
		let api = self.api.as_ref();

		let org_token = steps::switch_organization(api, root, organization)
			.await
			.map_err(|e| (Step::SwitchOrganization, e))?;

		steps::wait_for_default_userstore(api, &org_token, self.poll_budget, self.poll_interval)
			.await
			.map_err(|e| (Step::WaitUserstore, e))?;

		let user = steps::create_admin_user(
			api,
			&org_token,
			request,
			self.poll_budget,
			self.poll_interval,
		)
		.await
		.map_err(|e| (Step::CreateUser, e))?;

		let application_id = steps::find_application(api, &org_token, &request.app_name)
			.await
			.map_err(|e| (Step::FindApplication, e))?;

		let role_id = steps::resolve_admin_role(api, &org_token, &application_id, &self.admin_role)
			.await
			.map_err(|e| (Step::ResolveRole, e))?;

		let role_assignment = steps::assign_admin_role(
			api,
			&org_token,
			&role_id,
			&user.id,
			self.poll_budget,
			self.poll_interval,
		)
		.await
		.map_err(|e| (Step::AssignRole, e))?;

		Ok((user, role_assignment))
	}
}

fn failure(step: Step, err: StepError, compensated: bool) -> SagaOutcome {
	warn!(step = %step, error = %err, compensated, "signup saga failed");
	SagaOutcome::Failure(SagaFailure {
		step,
		status: err.status(),
		error: err.to_string(),
		details: err.details(),
		compensated,
	})
}
