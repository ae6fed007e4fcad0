use std::{
	sync::{
		Mutex,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use quarry_service::{AnalyticsSink, BoxFuture, Error, Result};
use quarry_storage::models::QueryAnalytics;

/// Keeps every record in memory. Can be switched to fail every write, or to hold each write
/// for a fixed delay.
#[derive(Default)]
pub struct RecordingAnalyticsSink {
	records: Mutex<Vec<QueryAnalytics>>,
	failing: AtomicBool,
	stall: Option<Duration>,
}
impl RecordingAnalyticsSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn failing() -> Self {
		Self { failing: AtomicBool::new(true), ..Self::default() }
	}

	/// Sleeps for `delay` before storing each record.
	pub fn stalling(delay: Duration) -> Self {
		Self { stall: Some(delay), ..Self::default() }
	}

	pub fn records(&self) -> Vec<QueryAnalytics> {
		self.records.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn push(&self, record: &QueryAnalytics) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(Error::Storage { message: "analytics sink is offline".to_string() });
		}

		self.records.lock().unwrap_or_else(|err| err.into_inner()).push(record.clone());

		Ok(())
	}
}
impl AnalyticsSink for RecordingAnalyticsSink {
	fn record<'a>(&'a self, record: &'a QueryAnalytics) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if let Some(delay) = self.stall {
				tokio::time::sleep(delay).await;
			}

			self.push(record)
		})
	}
}
