use std::{env, fmt};

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::DatabaseErrorKind::UniqueViolation;
use diesel::result::Error::{DatabaseError, NotFound};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenv::dotenv;

pub type Result<T> = std::result::Result<T, Error>;
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledSqliteConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Per-connection pragmas: referential integrity is enforced by the store,
/// and writers wait on the file lock instead of failing immediately.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
	fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
		conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
			.map_err(diesel::r2d2::Error::QueryError)
	}
}

/// Get a pooled connection to the underlying SQLite database
///
/// `DATABASE_URL` may be set in the environment or a `.env` file in the
/// working directory; defaults to `ledger.db` when unset.
pub fn sqlite_connection() -> SqlitePool {
	dotenv().ok();
	let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "ledger.db".to_string());
	pool_for(&database_url)
}

/// Build a pool against an explicit database path
pub fn pool_for(database_url: &str) -> SqlitePool {
	let manager = ConnectionManager::<SqliteConnection>::new(database_url);
	let pool = Pool::builder()
		.connection_customizer(Box::new(ConnectionOptions))
		.build(manager)
		.expect("Failed to create pool.");

	pool
}

/// Bring the schema up to date
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
	conn.run_pending_migrations(MIGRATIONS)
		.map(|_| ())
		.map_err(|e| Error::Migration(e.to_string()))
}

/// Error that can occur when querying against the database
#[derive(Debug, PartialEq)]
pub enum Error {
	RecordAlreadyExists,
	RecordNotFound,
	Connection(String),
	Migration(String),
	/// Used as a catch-all for the remaining diesel failures
	DatabaseError(diesel::result::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordAlreadyExists => write!(f, "record violates a unique constraint"),
			Error::RecordNotFound => write!(f, "record does not exist"),
			Error::Connection(e) => write!(f, "opening database connection: {}", e),
			Error::Migration(e) => write!(f, "running migrations: {}", e),
			Error::DatabaseError(e) => write!(f, "database error: {:?}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		match e {
			DatabaseError(UniqueViolation, _) => Error::RecordAlreadyExists,
			NotFound => Error::RecordNotFound,

			_ => Error::DatabaseError(e),
		}
	}
}

impl From<diesel::r2d2::PoolError> for Error {
	fn from(e: diesel::r2d2::PoolError) -> Self {
		Error::Connection(e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use crate::testutil::Fixture;

	#[test]
	fn connection() {
		let f = Fixture::new();
		f.pool.get().expect("get a db connection");
	}
}
