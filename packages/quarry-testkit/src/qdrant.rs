use std::time::Duration;

use qdrant_client::Qdrant;
use tokio::time;
use uuid::Uuid;

use crate::{Error, Result};

const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// A uniquely named collection on a live Qdrant. The collection itself is created by the
/// code under test.
pub struct TestCollection {
	url: String,
	name: String,
}
impl TestCollection {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into(), name: format!("quarry_test_{}", Uuid::new_v4().simple()) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn qdrant_config(&self, vector_dim: u32) -> quarry_config::Qdrant {
		quarry_config::Qdrant { url: self.url.clone(), collection: self.name.clone(), vector_dim }
	}

	pub async fn cleanup(self) -> Result<()> {
		let client = Qdrant::from_url(&self.url).build()?;

		if !client.collection_exists(self.name.clone()).await? {
			return Ok(());
		}

		time::timeout(DELETE_TIMEOUT, client.delete_collection(self.name.clone()))
			.await
			.map_err(|_| Error::Cleanup(format!("Timed out deleting collection {}.", self.name)))??;

		Ok(())
	}
}
