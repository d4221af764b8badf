//! Reqwest-backed [`IdentityApi`] implementation against a WSO2-style
//! organization management API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use super::{ApiOutcome, IdentityApi, NewUser, OrgToken, ProviderError, RootToken};

pub struct HttpIdentityApi {
	http: reqwest::Client,
	base: Url,
	client_id: String,
	client_secret: SecretString,
}

impl HttpIdentityApi {
	pub fn new(
		base: Url,
		client_id: String,
		client_secret: SecretString,
	) -> Result<Self, ProviderError> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()?;
		Ok(Self {
			http,
			base,
			client_id,
			client_secret,
		})
	}

	fn url(&self, path: &str) -> Result<Url, ProviderError> {
		Ok(self.base.join(path)?)
	}

	/// Sends the request and folds the response into an [`ApiOutcome`].
	/// Bodies that are not JSON degrade to `Value::Null` rather than faulting.
	async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiOutcome, ProviderError> {
		let response = request.send().await?;
		let status = response.status();
		let body = response.json::<Value>().await.unwrap_or(Value::Null);
		Ok(ApiOutcome { status, body })
	}
}

#[async_trait]
impl IdentityApi for HttpIdentityApi {
	async fn issue_root_token(&self) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.post(self.url("/oauth2/token")?)
			.basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
			.form(&[("grant_type", "client_credentials"), ("scope", "SYSTEM")]);
		self.send(request).await
	}

	async fn check_organization_name(
		&self,
		token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.post(self.url("/api/server/v1/organizations/check-name")?)
			.bearer_auth(token.0.expose_secret())
			.json(&json!({ "name": name }));
		self.send(request).await
	}

	async fn create_organization(
		&self,
		token: &RootToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.post(self.url("/api/server/v1/organizations")?)
			.bearer_auth(token.0.expose_secret())
			.json(&json!({ "name": name }));
		self.send(request).await
	}

	async fn delete_organization(
		&self,
		token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.delete(self.url(&format!("/api/server/v1/organizations/{organization_id}"))?)
			.bearer_auth(token.0.expose_secret());
		self.send(request).await
	}

	async fn switch_organization(
		&self,
		token: &RootToken,
		organization_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.post(self.url("/oauth2/token")?)
			.basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
			.form(&[
				("grant_type", "organization_switch"),
				("switching_organization", organization_id),
				("token", token.0.expose_secret()),
				("scope", "SYSTEM"),
			]);
		self.send(request).await
	}

	async fn list_userstores(&self, token: &OrgToken) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.get(self.url("/o/api/server/v1/userstores")?)
			.bearer_auth(token.token.expose_secret());
		self.send(request).await
	}

	async fn create_user(
		&self,
		token: &OrgToken,
		user: &NewUser<'_>,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.post(self.url("/o/scim2/Users")?)
			.bearer_auth(token.token.expose_secret())
			.json(&json!({
				"schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
				"userName": format!("DEFAULT/{}", user.email),
				"name": {
					"givenName": user.first_name,
					"familyName": user.last_name,
				},
				"password": user.password.expose_secret(),
				"emails": [{ "primary": true, "value": user.email }],
			}));
		self.send(request).await
	}

	async fn list_applications(
		&self,
		token: &OrgToken,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.get(self.url("/o/api/server/v1/applications")?)
			.bearer_auth(token.token.expose_secret())
			.query(&[("filter", format!("name eq {name}"))]);
		self.send(request).await
	}

	async fn list_roles(
		&self,
		token: &OrgToken,
		application_id: &str,
		name: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.get(self.url("/o/scim2/v2/Roles")?)
			.bearer_auth(token.token.expose_secret())
			.query(&[(
				"filter",
				format!("displayName eq {name} and audience.value eq {application_id}"),
			)]);
		self.send(request).await
	}

	async fn assign_role(
		&self,
		token: &OrgToken,
		role_id: &str,
		user_id: &str,
	) -> Result<ApiOutcome, ProviderError> {
		let request = self
			.http
			.patch(self.url(&format!("/o/scim2/v2/Roles/{role_id}"))?)
			.bearer_auth(token.token.expose_secret())
			.json(&json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
				"Operations": [{
					"op": "add",
					"value": { "users": [{ "value": user_id }] },
				}],
			}));
		self.send(request).await
	}
}
