use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use onboard::config::Config;
use onboard::provider::HttpIdentityApi;
use onboard::saga::Orchestrator;
use onboard::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let config = Config::from_env().context("loading configuration")?;

	let api = Arc::new(
		HttpIdentityApi::new(
			config.idp_base_url.clone(),
			config.client_id.clone(),
			config.client_secret.clone(),
		)
		.context("building identity provider client")?,
	);
	let orchestrator = Arc::new(Orchestrator::new(
		api,
		config.admin_role.clone(),
		config.poll_budget,
		config.poll_interval,
	));

	let listener = tokio::net::TcpListener::bind(config.bind)
		.await
		.with_context(|| format!("binding {}", config.bind))?;
	info!(addr = %config.bind, admin_role = %config.admin_role, "onboardd listening");
	axum::serve(listener, server::router(orchestrator))
		.await
		.context("serving")?;
	Ok(())
}
