//! The single compensating action: deleting a partially provisioned
//! organization.

use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::{error, info};

use crate::provider::{IdentityApi, RootToken};

pub struct Compensator {
	api: Arc<dyn IdentityApi>,
}

impl Compensator {
	pub fn new(api: Arc<dyn IdentityApi>) -> Self {
		Self { api }
	}

	/// Deletes the organization and reports whether the provider confirmed
	/// the deletion: HTTP 200 with an explicit success flag in the payload.
	/// Anything else is "not confirmed" — the organization may be orphaned
	/// and needs out-of-band operator cleanup, so the failure is logged here
	/// and never escalated into the saga's primary error.
	pub async fn delete_organization(&self, token: &RootToken, organization_id: &str) -> bool {
		match self.api.delete_organization(token, organization_id).await {
			Ok(outcome) if outcome.status == StatusCode::OK && confirmed(&outcome.body) => {
				info!(organization_id, "compensation confirmed: organization deleted");
				true
			}
			Ok(outcome) => {
				error!(
					organization_id,
					status = %outcome.status,
					body = %outcome.body,
					"compensation not confirmed; organization may be orphaned"
				);
				false
			}
			Err(err) => {
				error!(
					organization_id,
					error = %err,
					"compensation call failed; organization may be orphaned"
				);
				false
			}
		}
	}
}

fn confirmed(body: &Value) -> bool {
	body["success"].as_bool() == Some(true)
}
