use std::fmt;

use crate::db;

/// An error that can occur while reading or mutating the ledger
#[derive(Debug, PartialEq)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	pub fn validation(msg: impl Into<String>) -> Error {
		Error::new(ErrorKind::Validation(msg.into()))
	}

	pub fn not_found(entity: &'static str) -> Error {
		Error::new(ErrorKind::NotFound(entity))
	}

	pub fn state_conflict(msg: impl Into<String>) -> Error {
		Error::new(ErrorKind::StateConflict(msg.into()))
	}

	pub fn unauthorized(operation: &'static str) -> Error {
		Error::new(ErrorKind::Unauthorized(operation))
	}
}

/// The kind of an error that can occur.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
	Database(db::Error),
	/// Malformed input: bad amount, month out of range, empty field
	Validation(String),
	/// A referenced entity does not exist
	NotFound(&'static str),
	/// The entity exists but is not in a state the operation accepts,
	/// e.g. approving a proof that has already been reviewed
	StateConflict(String),
	/// The actor's role does not permit the operation
	Unauthorized(&'static str),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			ErrorKind::Database(e) => write!(f, "db error: {}", e),
			ErrorKind::Validation(msg) => write!(f, "invalid input: {}", msg),
			ErrorKind::NotFound(entity) => write!(f, "{} not found", entity),
			ErrorKind::StateConflict(msg) => write!(f, "conflicting state: {}", msg),
			ErrorKind::Unauthorized(operation) => write!(f, "not permitted to {}", operation),
		}
	}
}

impl std::error::Error for Error {}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::new(ErrorKind::Database(e))
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}

impl From<diesel::r2d2::PoolError> for Error {
	fn from(e: diesel::r2d2::PoolError) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}
