//! The cooperative's aggregate cash position.
//!
//! Only the seed balance is persisted. Everything else is recomputed from
//! the raw contribution, installment, and loan rows on every read, so the
//! figures can always be audited back to their source records and a
//! partial write can never leave a drifted running total behind.

use diesel::dsl::{count_distinct, sum};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::contribution::PaymentStatus;
use crate::db;
use crate::emi;
use crate::loan::{LoanStatus, Repo as LoanRepo, RepaymentStatus};
use crate::member::Repo as MemberRepo;
use crate::schema::{contributions, fund, installments, loans};
use crate::types::Id;

#[derive(Queryable, Identifiable, PartialEq, Debug)]
#[diesel(table_name = fund)]
pub struct Fund {
	pub id: Id,
	pub seed_balance: f64,
}

pub struct Repo;

impl Repo {
	/// The singleton seed row
	pub fn seed(conn: &mut SqliteConnection) -> db::Result<Fund> {
		fund::table
			.first(conn)
			.map_err(Into::into)
	}

	pub fn set_seed_balance(conn: &mut SqliteConnection, seed_balance: f64) -> db::Result<Fund> {
		diesel::update(fund::table)
			.set(fund::seed_balance.eq(seed_balance))
			.execute(conn)?;

		Self::seed(conn)
	}
}

/// Snapshot of the fund derived from the ledgers at one instant
#[derive(Debug, PartialEq, Serialize)]
pub struct FundSummary {
	/// seed + collections + repayments - principal disbursed
	pub balance: f64,
	pub seed_balance: f64,
	pub total_collections: f64,
	pub total_repayments: f64,
	pub total_loans_issued: f64,
	/// Interest income re-derived installment by installment
	pub interest_earned: f64,
	/// Principal still out across open loans
	pub outstanding_principal: f64,
	pub active_loans: i64,
	pub closed_loans: i64,
	/// Members yet to pay the current month's dues
	pub pending_contributions: i64,
}

/// Recompute the full fund picture. `month`/`year` identify the current
/// period for the pending-contributions count.
pub fn summary(conn: &mut SqliteConnection, month: i32, year: i32) -> db::Result<FundSummary> {
	let seed_balance = Repo::seed(conn)?.seed_balance;
	let total_collections = sum_paid_contributions(conn)?;
	let total_repayments = sum_paid_installments(conn)?;
	let total_loans_issued = sum_disbursed_principal(conn)?;

	let balance = seed_balance + total_collections + total_repayments - total_loans_issued;

	let member_count = MemberRepo::member_count(conn)?;
	let paid_this_month = members_paid_for_month(conn, month, year)?;

	Ok(FundSummary {
		balance,
		seed_balance,
		total_collections,
		total_repayments,
		total_loans_issued,
		interest_earned: interest_earned(conn)?,
		outstanding_principal: outstanding_principal_total(conn)?,
		active_loans: LoanRepo::count_by_repayment_status(conn, RepaymentStatus::Open)?,
		closed_loans: LoanRepo::count_by_repayment_status(conn, RepaymentStatus::Closed)?,
		pending_contributions: member_count - paid_this_month,
	})
}

pub fn sum_paid_contributions(conn: &mut SqliteConnection) -> db::Result<f64> {
	contributions::table
		.filter(contributions::status.eq(PaymentStatus::Paid))
		.select(sum(contributions::amount))
		.first::<Option<f64>>(conn)
		.map(|total| total.unwrap_or(0.0))
		.map_err(Into::into)
}

pub fn sum_paid_installments(conn: &mut SqliteConnection) -> db::Result<f64> {
	installments::table
		.filter(installments::status.eq(PaymentStatus::Paid))
		.select(sum(installments::amount))
		.first::<Option<f64>>(conn)
		.map(|total| total.unwrap_or(0.0))
		.map_err(Into::into)
}

/// Principal handed out: every approved loan, open or closed
pub fn sum_disbursed_principal(conn: &mut SqliteConnection) -> db::Result<f64> {
	loans::table
		.filter(loans::status.eq(LoanStatus::Approved))
		.select(sum(loans::amount))
		.first::<Option<f64>>(conn)
		.map(|total| total.unwrap_or(0.0))
		.map_err(Into::into)
}

/// Interest income across every paid installment.
///
/// The stored installment amount is the member's full EMI figure, so the
/// interest component is re-derived from the parent loan's original terms
/// and the installment's month index rather than read off the row.
pub fn interest_earned(conn: &mut SqliteConnection) -> db::Result<f64> {
	let rows: Vec<(i32, f64, i32, f64)> = installments::table
		.inner_join(loans::table)
		.filter(installments::status.eq(PaymentStatus::Paid))
		.select((
			installments::month_no,
			loans::amount,
			loans::total_months,
			loans::interest_rate_percent,
		))
		.load(conn)?;

	Ok(rows
		.into_iter()
		.map(|(month_no, amount, total_months, rate)| {
			emi::interest_component(amount, total_months as u32, rate, month_no as u32)
		})
		.sum())
}

/// Sum of dynamic remaining balances over open loans
pub fn outstanding_principal_total(conn: &mut SqliteConnection) -> db::Result<f64> {
	let open = LoanRepo::active(conn)?;

	let mut total = 0.0;
	for loan in open {
		let months_paid = crate::loan::InstallmentRepo::paid_count(conn, loan.id)?;
		total += loan.outstanding_after(months_paid as u32);
	}

	Ok(total)
}

fn members_paid_for_month(conn: &mut SqliteConnection, month: i32, year: i32) -> db::Result<i64> {
	contributions::table
		.filter(contributions::month.eq(month))
		.filter(contributions::year.eq(year))
		.filter(contributions::status.eq(PaymentStatus::Paid))
		.select(count_distinct(contributions::member_id))
		.get_result(conn)
		.map_err(Into::into)
}

#[cfg(test)]
mod tests {
	use crate::testutil::Fixture;

	use super::*;

	#[test]
	fn seed_balance_is_provisioned_and_editable() {
		let f = Fixture::new();
		let conn = &mut f.conn();

		let fund = Repo::seed(conn).unwrap();
		assert_eq!(fund.seed_balance, 20000.0);

		let fund = Repo::set_seed_balance(conn, 25000.0).unwrap();
		assert_eq!(fund.seed_balance, 25000.0);
	}

	#[test]
	fn empty_ledgers_sum_to_seed() {
		let f = Fixture::new();
		let conn = &mut f.conn();

		let got = summary(conn, 1, 2026).unwrap();
		assert_eq!(got.balance, 20000.0);
		assert_eq!(got.total_collections, 0.0);
		assert_eq!(got.interest_earned, 0.0);
		assert_eq!(got.active_loans, 0);
	}
}
