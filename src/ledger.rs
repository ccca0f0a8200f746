pub mod error;
pub mod service;

pub use error::{Error, ErrorKind};
pub use service::{Alert, MemberDashboard, Result, Service};
