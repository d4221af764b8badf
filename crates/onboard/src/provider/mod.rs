//! Outbound boundary to the identity-and-organization-management service.
//!
//! The saga never talks HTTP directly; it goes through [`IdentityApi`], which
//! exposes one method per remote operation. Every method returns the raw
//! [`ApiOutcome`] (status + best-effort JSON body) for calls that completed at
//! the transport level, and [`ProviderError`] only for transport faults. The
//! saga interprets outcomes; the provider layer does not.

mod client;

use async_trait::async_trait;
use http::StatusCode;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

pub use client::HttpIdentityApi;

/// Result of one provider call that produced an HTTP response.
///
/// `body` is `Value::Null` when the response carried no JSON; the saga only
/// needs the status plus whatever detail the provider included.
#[derive(Debug, Clone)]
pub struct ApiOutcome {
	pub status: StatusCode,
	pub body: Value,
}

impl ApiOutcome {
	pub fn ok(&self) -> bool {
		self.status.is_success()
	}
}

/// Transport-level failure talking to the provider. Remote rejections are not
/// errors at this layer; they come back as an [`ApiOutcome`].
#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("request to identity provider failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("invalid identity provider url: {0}")]
	Url(#[from] url::ParseError),
}

/// Token authorized for organization-level administrative operations
/// (create/delete/switch). Obtained once per saga run, before any step.
#[derive(Clone)]
pub struct RootToken(pub SecretString);

/// Token scoped to a single organization, obtained by exchanging the root
/// token after creation. Authorizes all per-tenant operations.
#[derive(Clone)]
pub struct OrgToken {
	pub organization_id: String,
	pub token: SecretString,
}

/// Fields for the administrative user created inside the new organization.
pub struct NewUser<'a> {
	pub first_name: &'a str,
	pub last_name: &'a str,
	pub email: &'a str,
	pub password: &'a SecretString,
}

/// The remote identity/organization-management API, one method per logical
/// operation the saga performs.
#[async_trait]
pub trait IdentityApi: Send + Sync {
	/// Client-credentials token issuance for the root scope.
	async fn issue_root_token(&self) -> Result<ApiOutcome, ProviderError>;

	/// Organization name uniqueness/format check.
	async fn check_organization_name(
		&self,
		token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError>;

	async fn create_organization(
		&self,
		token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError>;

	/// The compensating action: removes a partially provisioned organization.
	async fn delete_organization(
		&self,
		token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError>;

	/// Exchanges the root token for an organization-scoped token.
	async fn switch_organization(
		&self,
		token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError>;

	/// Lists the organization's userstores; used to observe whether the
	/// DEFAULT store has been provisioned yet.
	async fn list_userstores(&self, token: &OrgToken) -> Result<ApiOutcome, ProviderError>;

	async fn create_user(
		&self,
		token: &OrgToken,
		user: &NewUser<'_>,
	) -> Result<ApiOutcome, ProviderError>;

	/// Lists applications in the organization filtered by exact name.
	async fn list_applications(
		&self,
		token: &OrgToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError>;

	/// Lists roles whose audience is the given application and whose display
	/// name matches.
	async fn list_roles(
		&self,
		token: &OrgToken,
		application_id: &str,
		name: &str,
	) -> Result<ApiOutcome, ProviderError>;

	/// Patches the user into the role's member list.
	async fn assign_role(
		&self,
		token: &OrgToken,
		role_id: &str,
		user_id: &str,
	) -> Result<ApiOutcome, ProviderError>;
}
