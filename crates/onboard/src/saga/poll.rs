//! Bounded poll-until-ready loop for eventually-consistent remote state.
//!
//! Three steps (userstore wait, user creation, role assignment) share this
//! loop instead of rolling their own retries.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// One observation of the remote precondition.
pub enum Attempt<T> {
	/// The precondition holds; polling stops and `T` is handed back.
	Ready(T),
	/// Not there yet; sleep one interval and try again.
	Pending,
	/// The attempt itself failed (transport fault, unexpected status). A
	/// single stray failure never aborts the loop; it is logged and the loop
	/// keeps going until the deadline.
	Failed(String),
}

/// What the loop observed by the time it stopped.
pub struct PollOutcome<T> {
	/// False means the budget elapsed without the precondition holding.
	/// Callers map that to their timeout failure kind; no upstream error
	/// detail exists in that case.
	pub ready: bool,
	pub last: Option<T>,
	pub attempts: u32,
}

/// Invokes `attempt` until it reports ready or `budget` elapses, sleeping the
/// full `interval` between attempts.
pub async fn poll_until_ready<T, F, Fut>(
	budget: Duration,
	interval: Duration,
	mut attempt: F,
) -> PollOutcome<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Attempt<T>>,
{
	let deadline = Instant::now() + budget;
	let mut attempts = 0u32;
	loop {
		attempts += 1;
		match attempt().await {
			Attempt::Ready(value) => {
				return PollOutcome {
					ready: true,
					last: Some(value),
					attempts,
				};
			}
			Attempt::Pending => {}
			Attempt::Failed(reason) => {
				warn!(attempt = attempts, %reason, "poll attempt failed; retrying until deadline");
			}
		}
		if Instant::now() >= deadline {
			return PollOutcome {
				ready: false,
				last: None,
				attempts,
			};
		}
		tokio::time::sleep(interval).await;
	}
}
