use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::dsl::sum;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteConnection};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::contribution::PaymentStatus;
use crate::db;
use crate::emi::{self, Emi};
use crate::schema::{installments, loans, members};
use crate::types::{Id, Time};

/// Monthly rate applied to every new loan request
pub const DEFAULT_INTEREST_RATE_PERCENT: f64 = 1.0;

#[derive(Queryable, Identifiable, PartialEq, Clone, Debug)]
#[diesel(table_name = loans)]
pub struct Loan {
	pub id: Id,
	pub member_id: Id,
	pub amount: f64,
	pub interest_rate_percent: f64,
	pub total_months: i32,
	pub status: LoanStatus,
	pub repayment_status: RepaymentStatus,
	pub request_time: Time,
	pub approved_time: Option<Time>,
	pub closed_time: Option<Time>,
	// Request-time snapshot of the first month's split. Display-only:
	// later months always go back through the calculator.
	pub emi_amount: f64,
	pub principal_portion: f64,
	pub interest_portion: f64,
}

impl Loan {
	/// Constant principal component of every installment
	pub fn principal_share(&self) -> f64 {
		if self.total_months == 0 {
			return 0.0;
		}
		self.amount / self.total_months as f64
	}

	/// Approved and still collecting installments
	pub fn is_open(&self) -> bool {
		self.status == LoanStatus::Approved && self.repayment_status == RepaymentStatus::Open
	}

	pub fn emi_for_month(&self, month_no: u32) -> Option<Emi> {
		emi::compute_installment(self.amount, self.total_months as u32, self.interest_rate_percent, month_no)
	}

	pub fn outstanding_after(&self, months_paid: u32) -> f64 {
		emi::outstanding_principal(self.amount, self.total_months as u32, months_paid)
	}
}

#[derive(Insertable)]
#[diesel(table_name = loans)]
pub struct NewLoan {
	pub member_id: Id,
	pub amount: f64,
	pub interest_rate_percent: f64,
	pub total_months: i32,
	pub status: LoanStatus,
	pub repayment_status: RepaymentStatus,
	pub request_time: Time,
	pub emi_amount: f64,
	pub principal_portion: f64,
	pub interest_portion: f64,
}

#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum LoanStatus {
	Pending,
	Approved,
	Rejected,
}

#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum RepaymentStatus {
	Open,
	Closed,
}

impl ToSql<Text, Sqlite> for LoanStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for LoanStatus
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(LoanStatus::from_str(&s)?)
	}
}

impl ToSql<Text, Sqlite> for RepaymentStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for RepaymentStatus
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(RepaymentStatus::from_str(&s)?)
	}
}

/// One paid monthly installment on a loan. Append-only; an admin may
/// delete a row as an irreversible correction.
#[derive(Queryable, Identifiable, PartialEq, Debug)]
#[diesel(table_name = installments)]
pub struct Installment {
	pub id: Id,
	pub loan_id: Id,
	pub month_no: i32,
	pub amount: f64,
	pub status: PaymentStatus,
	pub paid_date: Time,
}

#[derive(Insertable)]
#[diesel(table_name = installments)]
pub struct NewInstallment {
	pub loan_id: Id,
	pub month_no: i32,
	pub amount: f64,
	pub status: PaymentStatus,
	pub paid_date: Time,
}

pub struct Repo;

impl Repo {
	pub fn create(conn: &mut SqliteConnection, new_loan: NewLoan) -> db::Result<Loan> {
		diesel::insert_into(loans::table)
			.values(&new_loan)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(conn: &mut SqliteConnection, id: Id) -> db::Result<Loan> {
		loans::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	pub fn for_member(conn: &mut SqliteConnection, member_id: Id) -> db::Result<Vec<Loan>> {
		loans::table
			.filter(loans::member_id.eq(member_id))
			.order(loans::request_time.desc())
			.load(conn)
			.map_err(Into::into)
	}

	/// Requests awaiting review, oldest first
	pub fn pending(conn: &mut SqliteConnection) -> db::Result<Vec<Loan>> {
		loans::table
			.filter(loans::status.eq(LoanStatus::Pending))
			.order(loans::request_time.asc())
			.load(conn)
			.map_err(Into::into)
	}

	/// Approved loans still collecting installments, newest approval first
	pub fn active(conn: &mut SqliteConnection) -> db::Result<Vec<Loan>> {
		loans::table
			.filter(loans::status.eq(LoanStatus::Approved))
			.filter(loans::repayment_status.eq(RepaymentStatus::Open))
			.order(loans::approved_time.desc())
			.load(conn)
			.map_err(Into::into)
	}

	pub fn set_approved(conn: &mut SqliteConnection, id: Id, approved_time: Time) -> db::Result<Loan> {
		diesel::update(loans::table)
			.filter(loans::id.eq(id))
			.set((
				loans::status.eq(LoanStatus::Approved),
				loans::repayment_status.eq(RepaymentStatus::Open),
				loans::approved_time.eq(Some(approved_time)),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	pub fn set_rejected(conn: &mut SqliteConnection, id: Id) -> db::Result<Loan> {
		diesel::update(loans::table)
			.filter(loans::id.eq(id))
			.set(loans::status.eq(LoanStatus::Rejected))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	pub fn close(conn: &mut SqliteConnection, id: Id, closed_time: Time) -> db::Result<Loan> {
		diesel::update(loans::table)
			.filter(loans::id.eq(id))
			.set((
				loans::repayment_status.eq(RepaymentStatus::Closed),
				loans::closed_time.eq(Some(closed_time)),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	/// Undo a close after an installment correction drops the paid count
	/// back below the term
	pub fn reopen(conn: &mut SqliteConnection, id: Id) -> db::Result<Loan> {
		diesel::update(loans::table)
			.filter(loans::id.eq(id))
			.set((
				loans::repayment_status.eq(RepaymentStatus::Open),
				loans::closed_time.eq(None::<Time>),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	pub fn count_by_repayment_status(conn: &mut SqliteConnection, repayment_status: RepaymentStatus) -> db::Result<i64> {
		loans::table
			.filter(loans::status.eq(LoanStatus::Approved))
			.filter(loans::repayment_status.eq(repayment_status))
			.count()
			.get_result(conn)
			.map_err(Into::into)
	}

	/// The repayment tracking board: every approved loan with its paid
	/// count, dynamic remaining balance, and the split of the month
	/// currently due.
	pub fn tracking_rows(conn: &mut SqliteConnection) -> db::Result<Vec<LoanTrackingRow>> {
		let rows: Vec<(Loan, String)> = loans::table
			.inner_join(members::table)
			.filter(loans::status.eq(LoanStatus::Approved))
			.order(loans::approved_time.desc())
			.select((loans::all_columns, members::name))
			.load(conn)?;

		let mut board = Vec::with_capacity(rows.len());
		for (loan, member) in rows {
			let months_paid = InstallmentRepo::paid_count(conn, loan.id)?;
			let total_paid = InstallmentRepo::paid_total(conn, loan.id)?;
			let remaining_balance = loan.outstanding_after(months_paid as u32);

			let (current_emi, current_interest) = if loan.repayment_status == RepaymentStatus::Open {
				match loan.emi_for_month(months_paid as u32 + 1) {
					Some(emi) => (emi.total_due, emi.interest_due),
					// past the term with no close recorded; fall back to
					// the request-time snapshot
					None => (loan.emi_amount, loan.interest_portion),
				}
			} else {
				(0.0, 0.0)
			};

			board.push(LoanTrackingRow {
				loan_id: loan.id,
				member,
				amount: loan.amount,
				total_months: loan.total_months,
				repayment_status: loan.repayment_status.to_string(),
				months_paid,
				total_paid,
				remaining_balance,
				current_emi,
				current_interest,
			});
		}

		Ok(board)
	}
}

pub struct InstallmentRepo;

impl InstallmentRepo {
	pub fn create(conn: &mut SqliteConnection, new_installment: NewInstallment) -> db::Result<Installment> {
		diesel::insert_into(installments::table)
			.values(&new_installment)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(conn: &mut SqliteConnection, id: Id) -> db::Result<Installment> {
		installments::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	pub fn for_loan(conn: &mut SqliteConnection, loan_id: Id) -> db::Result<Vec<Installment>> {
		installments::table
			.filter(installments::loan_id.eq(loan_id))
			.order(installments::month_no.asc())
			.load(conn)
			.map_err(Into::into)
	}

	pub fn paid_count(conn: &mut SqliteConnection, loan_id: Id) -> db::Result<i64> {
		installments::table
			.filter(installments::loan_id.eq(loan_id))
			.filter(installments::status.eq(PaymentStatus::Paid))
			.count()
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn paid_total(conn: &mut SqliteConnection, loan_id: Id) -> db::Result<f64> {
		installments::table
			.filter(installments::loan_id.eq(loan_id))
			.filter(installments::status.eq(PaymentStatus::Paid))
			.select(sum(installments::amount))
			.first::<Option<f64>>(conn)
			.map(|total| total.unwrap_or(0.0))
			.map_err(Into::into)
	}

	pub fn delete(conn: &mut SqliteConnection, id: Id) -> db::Result<usize> {
		diesel::delete(installments::table.filter(installments::id.eq(id)))
			.execute(conn)
			.map_err(Into::into)
	}
}

/// An open loan paired with what its next installment looks like
#[derive(Debug)]
pub struct ActiveLoan {
	pub loan: Loan,
	pub next_month: u32,
	/// `None` once every month of the term has been paid
	pub next_emi: Option<Emi>,
}

#[derive(Debug, Serialize)]
pub struct LoanTrackingRow {
	pub loan_id: Id,
	pub member: String,
	pub amount: f64,
	pub total_months: i32,
	pub repayment_status: String,
	pub months_paid: i64,
	pub total_paid: f64,
	pub remaining_balance: f64,
	pub current_emi: f64,
	pub current_interest: f64,
}

#[cfg(test)]
mod tests {
	use crate::testutil::{datetime, Fixture};

	use super::*;

	#[test]
	fn create_and_approve_loan() {
		let f = Fixture::new();
		let conn = &mut f.conn();
		let ravi = f.member_factory.ravi();

		let loan = Repo::create(conn, f.new_loan(ravi.id, 10000.0, 5)).unwrap();
		assert_eq!(loan.status, LoanStatus::Pending);
		assert_eq!(loan.repayment_status, RepaymentStatus::Open);
		assert_eq!(loan.approved_time, None);

		let approved = Repo::set_approved(conn, loan.id, datetime(2026, 2, 1)).unwrap();
		assert_eq!(approved.status, LoanStatus::Approved);
		assert_eq!(approved.approved_time, Some(datetime(2026, 2, 1)));

		assert_eq!(Repo::pending(conn).unwrap().len(), 0);
		assert_eq!(Repo::active(conn).unwrap().len(), 1);
	}

	#[test]
	fn paid_count_and_total_track_installments() {
		let f = Fixture::new();
		let conn = &mut f.conn();
		let ravi = f.member_factory.ravi();
		let loan = Repo::create(conn, f.new_loan(ravi.id, 10000.0, 5)).unwrap();
		Repo::set_approved(conn, loan.id, datetime(2026, 2, 1)).unwrap();

		assert_eq!(InstallmentRepo::paid_count(conn, loan.id).unwrap(), 0);
		assert_eq!(InstallmentRepo::paid_total(conn, loan.id).unwrap(), 0.0);

		for (month_no, amount) in [(1, 2100.0), (2, 2080.0)] {
			InstallmentRepo::create(conn, NewInstallment {
				loan_id: loan.id,
				month_no,
				amount,
				status: PaymentStatus::Paid,
				paid_date: datetime(2026, 2 + month_no as u32, 10),
			}).unwrap();
		}

		assert_eq!(InstallmentRepo::paid_count(conn, loan.id).unwrap(), 2);
		assert_eq!(InstallmentRepo::paid_total(conn, loan.id).unwrap(), 4180.0);

		let loan = Repo::find_by_id(conn, loan.id).unwrap();
		assert_eq!(loan.outstanding_after(2), 6000.0);
	}

	#[test]
	fn close_and_reopen_round_trip() {
		let f = Fixture::new();
		let conn = &mut f.conn();
		let ravi = f.member_factory.ravi();
		let loan = Repo::create(conn, f.new_loan(ravi.id, 1000.0, 2)).unwrap();
		Repo::set_approved(conn, loan.id, datetime(2026, 2, 1)).unwrap();

		let closed = Repo::close(conn, loan.id, datetime(2026, 4, 10)).unwrap();
		assert_eq!(closed.repayment_status, RepaymentStatus::Closed);
		assert_eq!(closed.closed_time, Some(datetime(2026, 4, 10)));

		let reopened = Repo::reopen(conn, loan.id).unwrap();
		assert_eq!(reopened.repayment_status, RepaymentStatus::Open);
		assert_eq!(reopened.closed_time, None);
	}
}
