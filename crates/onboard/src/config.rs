//! Environment configuration for the service.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	Missing(&'static str),
	#[error("invalid value for {name}: {value:?}")]
	Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
	/// Listen address for the inbound HTTP surface.
	pub bind: SocketAddr,
	/// Base URL of the identity provider.
	pub idp_base_url: Url,
	pub client_id: String,
	pub client_secret: SecretString,
	/// Name of the role assigned to the admin user. The saga's only
	/// environment-derived input; everything else is process plumbing.
	pub admin_role: String,
	/// Deadline for each poll-until-ready step.
	pub poll_budget: Duration,
	/// Sleep between poll attempts.
	pub poll_interval: Duration,
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		Ok(Self {
			bind: parsed("ONBOARD_BIND", "0.0.0.0:8080")?,
			idp_base_url: required("IDP_BASE_URL").and_then(|raw| {
				raw.parse().map_err(|_| ConfigError::Invalid {
					name: "IDP_BASE_URL",
					value: raw,
				})
			})?,
			client_id: required("IDP_CLIENT_ID")?,
			client_secret: required("IDP_CLIENT_SECRET").map(SecretString::from)?,
			admin_role: std::env::var("ONBOARD_ADMIN_ROLE").unwrap_or_else(|_| "Admin".to_string()),
			poll_budget: Duration::from_secs(parsed("ONBOARD_POLL_BUDGET_SECS", "60")?),
			poll_interval: Duration::from_secs(parsed("ONBOARD_POLL_INTERVAL_SECS", "2")?),
		})
	}
}

fn required(name: &'static str) -> Result<String, ConfigError> {
	std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
	let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
	raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw })
}
