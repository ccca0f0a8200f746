use chrono::{NaiveDateTime, Utc};

pub type Id = i32;
pub type Time = NaiveDateTime;

/// Source of the current wall-clock time for ledger writes
pub trait Clock {
	fn now(&self) -> Time {
		Utc::now().naive_utc()
	}
}

/// Clock backed by the system time
pub struct SystemClock;

impl Clock for SystemClock {}

/// Clock pinned to a fixed instant, for tests
pub struct FixedClock(pub Time);

impl Clock for FixedClock {
	fn now(&self) -> Time {
		self.0
	}
}
