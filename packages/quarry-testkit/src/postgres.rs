use std::{str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor, PgPool,
	postgres::{PgConnectOptions, PgConnection, PgPoolOptions},
};
use tokio::runtime::Builder;
use uuid::Uuid;

use crate::{Error, Result};

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A throwaway database created next to the one `base_dsn` points at. Dropped on `cleanup`,
/// or on drop as a last resort.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn create(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Setup(format!("QUARRY_PG_DSN is not a valid DSN: {err}.")))?;
		let (maintenance, mut conn) = connect_maintenance(&base).await?;
		let name = format!("quarry_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Setup(format!("Could not create database {name}: {err}.")))?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn postgres_config(&self) -> quarry_config::Postgres {
		quarry_config::Postgres { dsn: self.dsn.clone(), pool_max_conns: 2 }
	}

	pub async fn pool(&self) -> Result<PgPool> {
		Ok(PgPoolOptions::new().max_connections(2).connect(&self.dsn).await?)
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.name, &self.maintenance).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		// The caller's runtime may be shutting down, so drop from a private one.
		let worker = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Could not start a runtime to drop {name}: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(drop_database(&name, &maintenance)) {
				eprintln!("{err}");
			}
		});

		let _ = worker.join();
	}
}

async fn connect_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut errors = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => errors.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Setup(format!("No maintenance database is reachable ({}).", errors.join("; "))))
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance)
		.await
		.map_err(|err| Error::Cleanup(format!("Could not connect to drop {name}: {err}.")))?;

	sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await
	.map_err(|err| Error::Cleanup(format!("Could not disconnect sessions of {name}: {err}.")))?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.await
		.map_err(|err| Error::Cleanup(format!("Could not drop {name}: {err}.")))?;

	Ok(())
}
