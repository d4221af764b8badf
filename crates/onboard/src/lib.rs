//! Tenant onboarding service.
//!
//! Onboards a new organization and its first administrative user against a
//! remote identity-and-organization-management API. The core is an onboarding
//! saga: a fixed sequence of dependent remote operations where any failure
//! after organization creation triggers compensation (deletion of the
//! partially created organization), so the remote system is never left
//! half-provisioned from the caller's point of view.

pub mod config;
pub mod provider;
pub mod saga;
pub mod server;
