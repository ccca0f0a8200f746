use std::sync::Arc;

use tempfile::TempDir;

use nidhi::db;
use nidhi::ledger::Service;
use nidhi::member::{Member, NewMember, Repo as MemberRepo, Role};
use nidhi::types::{FixedClock, Time};

pub fn datetime(year: i32, month: u32, day: u32) -> Time {
	chrono::NaiveDate::from_ymd_opt(year, month, day)
		.unwrap()
		.and_hms_opt(9, 30, 0)
		.unwrap()
}

/// A fresh migrated database in a temp directory
pub struct Fixture {
	pub pool: db::SqlitePool,
	_dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		let dir = tempfile::tempdir().expect("create temp dir");
		let path = dir.path().join("ledger.db");
		let pool = db::pool_for(path.to_str().expect("utf-8 temp path"));

		let conn = &mut pool.get().expect("get a db connection");
		db::run_migrations(conn).expect("run migrations");

		Fixture { pool, _dir: dir }
	}

	pub fn conn(&self) -> db::PooledSqliteConnection {
		self.pool.get().unwrap()
	}

	pub fn service(&self) -> Service {
		Service::new(self.pool.clone())
	}

	pub fn service_at(&self, now: Time) -> Service {
		Service::with_clock(self.pool.clone(), Arc::new(FixedClock(now)))
	}

	pub fn admin(&self) -> Member {
		let conn = &mut self.conn();
		MemberRepo::create(conn, NewMember {
			name: "Super Admin",
			username: "admin",
			password: "admin123",
			role: Role::Admin,
			join_date: datetime(2026, 1, 1),
		}).unwrap()
	}

	pub fn member(&self, name: &str, username: &str) -> Member {
		let conn = &mut self.conn();
		MemberRepo::create(conn, NewMember {
			name,
			username,
			password: "secret",
			role: Role::Member,
			join_date: datetime(2026, 1, 1),
		}).unwrap()
	}

	pub fn asha(&self) -> Member {
		self.member("Asha Patel", "asha")
	}

	pub fn ravi(&self) -> Member {
		self.member("Ravi Kumar", "ravi")
	}
}
