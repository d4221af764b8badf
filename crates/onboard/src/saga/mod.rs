//! The onboarding saga.
//!
//! A fixed sequence of dependent remote operations that provisions a new
//! organization and its first administrative user. Once the organization has
//! been created, every failure path runs exactly one compensation attempt
//! (deletion of the organization) before the failure is reported.
//!
//! Step order:
//!
//! 1. acquire root token
//! 2. validate organization name
//! 3. create organization          <- compensation boundary
//! 4. switch to the organization (token exchange)
//! 5. wait for the DEFAULT userstore (poll)
//! 6. create the admin user (poll)
//! 7. find the application by name
//! 8. resolve the admin role for that application
//! 9. assign the user to the role (poll)

mod compensate;
#[cfg(test)]
mod integration_tests;
mod orchestrator;
mod poll;
mod steps;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub use compensate::Compensator;
pub use orchestrator::{Orchestrator, SagaFailure, SagaOutcome, SignupSuccess, Step};
pub use poll::{Attempt, PollOutcome, poll_until_ready};
pub use steps::StepError;

/// Incoming signup request. All fields are required; presence is checked
/// before the saga starts and a request missing any field never reaches the
/// remote provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
	#[serde(default)]
	pub first_name: String,
	#[serde(default)]
	pub last_name: String,
	#[serde(default)]
	pub email: String,
	#[serde(default = "blank_secret")]
	pub password: SecretString,
	#[serde(default)]
	pub organization_name: String,
	#[serde(default)]
	pub app_name: String,
}

fn blank_secret() -> SecretString {
	SecretString::from(String::new())
}

impl SignupRequest {
	/// Names of required fields that are absent or blank, in wire order.
	pub fn missing_fields(&self) -> Vec<&'static str> {
		let mut missing = Vec::new();
		if self.first_name.trim().is_empty() {
			missing.push("firstName");
		}
		if self.last_name.trim().is_empty() {
			missing.push("lastName");
		}
		if self.email.trim().is_empty() {
			missing.push("email");
		}
		if self.password.expose_secret().is_empty() {
			missing.push("password");
		}
		if self.organization_name.trim().is_empty() {
			missing.push("organizationName");
		}
		if self.app_name.trim().is_empty() {
			missing.push("appName");
		}
		missing
	}
}

/// Organization as returned by the provider. `raw` is the full provider body
/// and is what callers see; `id` and `name` are extracted for the saga's own
/// use (later steps and compensation).
#[derive(Debug, Clone)]
pub struct OrganizationRecord {
	pub id: String,
	pub name: String,
	pub raw: Value,
}

impl Serialize for OrganizationRecord {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.raw.serialize(serializer)
	}
}

/// Admin user as returned by the provider.
#[derive(Debug, Clone)]
pub struct UserRecord {
	pub id: String,
	pub raw: Value,
}

impl Serialize for UserRecord {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.raw.serialize(serializer)
	}
}
