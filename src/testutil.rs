use std::sync::Arc;

use tempfile::TempDir;

use crate::db;
use crate::emi;
use crate::ledger::Service;
use crate::loan::{LoanStatus, NewLoan, RepaymentStatus, DEFAULT_INTEREST_RATE_PERCENT};
use crate::member::{Member, NewMember, Repo as MemberRepo, Role};
use crate::types::{FixedClock, Id, Time};

pub fn datetime(year: i32, month: u32, day: u32) -> Time {
	chrono::NaiveDate::from_ymd_opt(year, month, day)
		.unwrap()
		.and_hms_opt(9, 30, 0)
		.unwrap()
}

/// A fresh migrated database in a temp directory, plus factories
pub struct Fixture {
	pub pool: db::SqlitePool,
	pub member_factory: MemberFactory,
	_dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		let dir = tempfile::tempdir().expect("create temp dir");
		let path = dir.path().join("ledger.db");
		let pool = db::pool_for(path.to_str().expect("utf-8 temp path"));

		let conn = &mut pool.get().expect("get a db connection");
		db::run_migrations(conn).expect("run migrations");

		let member_factory = MemberFactory { pool: pool.clone() };
		Fixture { pool, member_factory, _dir: dir }
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

	/// A pending loan request with a realistic request-time snapshot
	pub fn new_loan(&self, member_id: Id, amount: f64, total_months: i32) -> NewLoan {
		let snapshot = emi::compute_installment(amount, total_months as u32, DEFAULT_INTEREST_RATE_PERCENT, 1)
			.expect("valid test loan terms");

		NewLoan {
			member_id,
			amount,
			interest_rate_percent: DEFAULT_INTEREST_RATE_PERCENT,
			total_months,
			status: LoanStatus::Pending,
			repayment_status: RepaymentStatus::Open,
			request_time: datetime(2026, 1, 15),
			emi_amount: snapshot.total_due,
			principal_portion: snapshot.principal_share,
			interest_portion: snapshot.interest_due,
		}
	}
}

pub struct MemberFactory {
	pool: db::SqlitePool,
}

impl MemberFactory {
	pub fn member(&self, name: &str, username: &str) -> Member {
		let conn = &mut self.pool.get().unwrap();
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

	pub fn admin(&self) -> Member {
		let conn = &mut self.pool.get().unwrap();
		MemberRepo::create(conn, NewMember {
			name: "Super Admin",
			username: "admin",
			password: "admin123",
			role: Role::Admin,
			join_date: datetime(2026, 1, 1),
		}).unwrap()
	}
}
