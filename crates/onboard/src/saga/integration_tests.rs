//! Integration tests for the onboarding saga.
//!
//! A scripted mock provider stands in for the remote identity service; tests
//! drive the orchestrator end to end and assert on the recorded calls,
//! especially when and with what the compensating delete is issued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use http::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::provider::{ApiOutcome, IdentityApi, NewUser, OrgToken, ProviderError, RootToken};
use crate::saga::{Compensator, Orchestrator, SagaOutcome, SignupRequest, Step};

/// Scripted provider. Each method pops the next scripted outcome for its
/// name; a single remaining outcome repeats, so poll loops can be fed one
/// "still pending" response.
struct MockIdentityApi {
	scripts: Mutex<HashMap<&'static str, VecDeque<ApiOutcome>>>,
	faults: Mutex<Vec<&'static str>>,
	calls: Mutex<Vec<(&'static str, String)>>,
}

impl MockIdentityApi {
	fn new() -> Self {
		Self {
			scripts: Mutex::new(HashMap::new()),
			faults: Mutex::new(Vec::new()),
			calls: Mutex::new(Vec::new()),
		}
	}

	fn mock(&self, method: &'static str, status: u16, body: Value) {
		self.scripts
			.lock()
			.unwrap()
			.entry(method)
			.or_default()
			.push_back(ApiOutcome {
				status: StatusCode::from_u16(status).unwrap(),
				body,
			});
	}

	/// Replaces the script for one method.
	fn set(&self, method: &'static str, status: u16, body: Value) {
		self.scripts.lock().unwrap().remove(method);
		self.mock(method, status, body);
	}

	/// Makes one method fail at the transport level.
	fn fault(&self, method: &'static str) {
		self.faults.lock().unwrap().push(method);
	}

	fn respond(&self, method: &'static str, detail: String) -> Result<ApiOutcome, ProviderError> {
		self.calls.lock().unwrap().push((method, detail));
		if self.faults.lock().unwrap().contains(&method) {
			return Err(ProviderError::Url(
				url::Url::parse("http://").expect_err("relative url"),
			));
		}
		let mut scripts = self.scripts.lock().unwrap();
		let queue = scripts
			.get_mut(method)
			.unwrap_or_else(|| panic!("no scripted response for {method}"));
		let outcome = if queue.len() > 1 {
			queue.pop_front().unwrap()
		} else {
			queue
				.front()
				.unwrap_or_else(|| panic!("script for {method} is empty"))
				.clone()
		};
		Ok(outcome)
	}

	fn call_count(&self, method: &str) -> usize {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|(m, _)| *m == method)
			.count()
	}

	fn call_sequence(&self) -> Vec<&'static str> {
		self.calls.lock().unwrap().iter().map(|(m, _)| *m).collect()
	}

	fn details_of(&self, method: &str) -> Vec<String> {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|(m, _)| *m == method)
			.map(|(_, d)| d.clone())
			.collect()
	}
}

#[async_trait]
impl IdentityApi for MockIdentityApi {
	async fn issue_root_token(&self) -> Result<ApiOutcome, ProviderError> {
		self.respond("issue_root_token", String::new())
	}

	async fn check_organization_name(
		&self,
		_token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("check_organization_name", name.to_string())
	}

	async fn create_organization(
		&self,
		_token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("create_organization", name.to_string())
	}

	async fn delete_organization(
		&self,
		token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond(
			"delete_organization",
			format!("{organization_id}:{}", token.0.expose_secret()),
		)
	}

	async fn switch_organization(
		&self,
		_token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("switch_organization", organization_id.to_string())
	}

	async fn list_userstores(&self, token: &OrgToken) -> Result<ApiOutcome, ProviderError> {
		self.respond("list_userstores", token.organization_id.clone())
	}

	async fn create_user(
		&self,
		_token: &OrgToken,
		user: &NewUser<'_>,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("create_user", user.email.to_string())
	}

	async fn list_applications(
		&self,
		_token: &OrgToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("list_applications", name.to_string())
	}

	async fn list_roles(
		&self,
		_token: &OrgToken,
		application_id: &str,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("list_roles", format!("{application_id}:{name}"))
	}

	async fn assign_role(
		&self,
		_token: &OrgToken,
		role_id: &str,
		user_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		self.respond("assign_role", format!("{role_id}:{user_id}"))
	}
}

fn request() -> SignupRequest {
	serde_json::from_value(json!({
		"firstName": "Ada",
		"lastName": "Lovelace",
		"email": "ada@example.com",
		"password": "hunter2",
		"organizationName": "ExampleOrg",
		"appName": "app1",
	}))
	.unwrap()
}

/// Scripts a full successful run; individual tests override single methods.
fn script_happy_path(api: &MockIdentityApi) {
	api.mock("issue_root_token", 200, json!({ "access_token": "root-token" }));
	api.mock("check_organization_name", 200, json!({ "available": true }));
	api.mock(
		"create_organization",
		201,
		json!({ "id": "org1", "name": "ExampleOrg" }),
	);
	api.mock("switch_organization", 200, json!({ "access_token": "org-token" }));
	api.mock("list_userstores", 200, json!([{ "name": "DEFAULT" }]));
	api.mock("create_user", 201, json!({ "id": "u1" }));
	api.mock(
		"list_applications",
		200,
		json!({ "applications": [{ "id": "app-id-1", "name": "app1" }] }),
	);
	api.mock(
		"list_roles",
		200,
		json!({ "Resources": [{ "id": "role1", "displayName": "Admin" }] }),
	);
	api.mock("assign_role", 200, json!({ "status": "ok" }));
	api.mock("delete_organization", 200, json!({ "success": true }));
}

fn orchestrator(api: Arc<MockIdentityApi>) -> Orchestrator {
	Orchestrator::new(
		api,
		"Admin".to_string(),
		Duration::from_secs(30),
		Duration::from_millis(100),
	)
}

#[tokio::test]
async fn happy_path_provisions_organization_user_and_role() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Success(success) = outcome else {
		panic!("expected success");
	};
	assert_eq!(success.organization.id, "org1");
	assert_eq!(success.user.id, "u1");
	assert_eq!(success.role_assignment["status"], "ok");

	// Strictly sequential, in step order, and no compensation.
	assert_eq!(
		api.call_sequence(),
		vec![
			"issue_root_token",
			"check_organization_name",
			"create_organization",
			"switch_organization",
			"list_userstores",
			"create_user",
			"list_applications",
			"list_roles",
			"assign_role",
		]
	);
	assert_eq!(api.details_of("assign_role"), vec!["role1:u1"]);
	assert_eq!(api.call_count("delete_organization"), 0);
}

#[tokio::test]
async fn rejected_token_exchange_compensates_and_passes_status_through() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set(
		"switch_organization",
		401,
		json!({ "description": "unauthorized" }),
	);

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::SwitchOrganization);
	assert_eq!(failure.status, StatusCode::UNAUTHORIZED);
	assert_eq!(failure.error, "Failed to switch to the new organization");
	assert_eq!(failure.details, Some(json!({ "description": "unauthorized" })));
	assert!(failure.compensated);

	// Exactly one delete, for the created organization, with the root token.
	assert_eq!(api.details_of("delete_organization"), vec!["org1:root-token"]);
}

#[tokio::test(start_paused = true)]
async fn userstore_never_ready_times_out_and_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("list_userstores", 200, json!([]));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::WaitUserstore);
	assert_eq!(failure.status, StatusCode::REQUEST_TIMEOUT);
	assert_eq!(
		failure.error,
		"Timed out waiting for DEFAULT userstore to be provisioned"
	);
	assert!(failure.details.is_none());
	assert!(failure.compensated);

	assert!(api.call_count("list_userstores") > 1, "should have polled");
	assert_eq!(api.call_count("delete_organization"), 1);
	assert_eq!(api.call_count("create_user"), 0);
}

#[tokio::test]
async fn missing_application_is_a_404_and_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("list_applications", 200, json!({ "applications": [] }));

	let mut req = request();
	req.app_name = "nonexistent".to_string();
	let outcome = orchestrator(api.clone()).run(&req).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::FindApplication);
	assert_eq!(failure.status, StatusCode::NOT_FOUND);
	assert_eq!(
		failure.error,
		"Sign up failed. Application 'nonexistent' not found"
	);
	assert!(failure.compensated);
	assert_eq!(api.call_count("delete_organization"), 1);
}

#[tokio::test]
async fn missing_admin_role_is_a_404_and_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("list_roles", 200, json!({ "Resources": [] }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::ResolveRole);
	assert_eq!(failure.status, StatusCode::NOT_FOUND);
	assert_eq!(failure.error, "Sign up failed. Admin role 'Admin' not found");
	assert!(failure.compensated);
}

#[tokio::test]
async fn unavailable_name_fails_before_creation_with_no_compensation() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("check_organization_name", 200, json!({ "available": false }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::ValidateName);
	assert_eq!(failure.status, StatusCode::CONFLICT);
	assert!(!failure.compensated);
	assert_eq!(api.call_count("create_organization"), 0);
	assert_eq!(api.call_count("delete_organization"), 0);
}

#[tokio::test]
async fn rejected_creation_fails_with_no_compensation() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("create_organization", 403, json!({ "detail": "forbidden" }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::CreateOrganization);
	assert_eq!(failure.status, StatusCode::FORBIDDEN);
	assert_eq!(failure.details, Some(json!({ "detail": "forbidden" })));
	assert!(!failure.compensated);
	assert_eq!(api.call_count("delete_organization"), 0);
}

#[tokio::test]
async fn malformed_token_response_is_a_bad_gateway() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("issue_root_token", 200, json!({ "note": "no token here" }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::RootToken);
	assert_eq!(failure.status, StatusCode::BAD_GATEWAY);
	assert!(!failure.compensated);
	assert_eq!(api.call_count("create_organization"), 0);
}

#[tokio::test]
async fn malformed_switch_response_is_a_bad_gateway_and_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	// 200 without an access token must not surface as a 200 failure.
	api.set("switch_organization", 200, json!({ "note": "no token here" }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::SwitchOrganization);
	assert_eq!(failure.status, StatusCode::BAD_GATEWAY);
	assert_eq!(failure.error, "Failed to switch to the new organization");
	assert!(failure.compensated);
	assert_eq!(api.call_count("delete_organization"), 1);
}

#[tokio::test]
async fn transport_fault_after_creation_still_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.fault("switch_organization");

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::SwitchOrganization);
	assert_eq!(failure.status, StatusCode::INTERNAL_SERVER_ERROR);
	assert!(failure.compensated);
	assert_eq!(api.call_count("delete_organization"), 1);
}

#[tokio::test(start_paused = true)]
async fn non_ok_assignment_status_fails_and_compensates() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	// Nominally successful call, but the provider never reports completion.
	api.set("assign_role", 200, json!({ "status": "PENDING" }));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	let SagaOutcome::Failure(failure) = outcome else {
		panic!("expected failure");
	};
	assert_eq!(failure.step, Step::AssignRole);
	assert_eq!(failure.status, StatusCode::REQUEST_TIMEOUT);
	assert!(failure.compensated);
	assert_eq!(api.call_count("delete_organization"), 1);
}

#[tokio::test]
async fn unconfirmed_deletion_reports_compensated_false() {
	let api = Arc::new(MockIdentityApi::new());
	script_happy_path(&api);
	api.set("switch_organization", 401, json!({}));
	// 200 without the explicit success flag is not a confirmed deletion.
	api.set("delete_organization", 200, json!({}));

	let outcome = orchestrator(api.clone()).run(&request()).await;

	assert_matches!(
		outcome,
		SagaOutcome::Failure(ref failure) if !failure.compensated
	);
	assert_eq!(api.call_count("delete_organization"), 1);
}

#[tokio::test]
async fn reinvoked_compensation_is_stable() {
	let api = Arc::new(MockIdentityApi::new());
	api.mock("delete_organization", 200, json!({ "success": true }));

	let compensator = Compensator::new(api.clone());
	let token = RootToken(SecretString::from("root-token".to_string()));

	assert!(compensator.delete_organization(&token, "org1").await);
	assert!(compensator.delete_organization(&token, "org1").await);
	assert_eq!(api.call_count("delete_organization"), 2);
}
