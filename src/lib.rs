pub mod contribution;
pub mod db;
pub mod emi;
pub mod export;
pub mod fund;
pub mod ledger;
pub mod loan;
pub mod member;
pub mod proof;
pub mod schema;
pub mod types;

#[cfg(test)]
mod testutil;

pub use member::{Actor, Member, Role};
pub use types::{Clock, FixedClock, Id, SystemClock, Time};
