//! Row projections for the spreadsheet export collaborator.
//!
//! The core hands over three plain row-sets; rendering the workbook is the
//! collaborator's problem.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::contribution::PaymentStatus;
use crate::db;
use crate::loan::Loan;
use crate::schema::{contributions, installments, loans, members};
use crate::types::{Id, Time};

#[derive(Debug, Serialize)]
pub struct ContributionRow {
	pub member: String,
	pub month: i32,
	pub year: i32,
	pub amount: f64,
	pub status: String,
	pub paid_date: Option<Time>,
}

#[derive(Debug, Serialize)]
pub struct InstallmentRow {
	pub member: String,
	pub loan_id: Id,
	pub month_no: i32,
	pub amount: f64,
	pub status: String,
	pub paid_date: Time,
}

#[derive(Debug, Serialize)]
pub struct LoanIssuedRow {
	pub member: String,
	pub loan_id: Id,
	pub amount: f64,
	pub interest_rate_percent: f64,
	pub total_months: i32,
	pub status: String,
	pub repayment_status: String,
	pub request_time: Time,
	pub approved_time: Option<Time>,
	pub closed_time: Option<Time>,
}

/// The three sheets of the transactions workbook
#[derive(Debug, Serialize)]
pub struct ExportBundle {
	pub contributions: Vec<ContributionRow>,
	pub installments: Vec<InstallmentRow>,
	pub loans_issued: Vec<LoanIssuedRow>,
}

pub fn collect(conn: &mut SqliteConnection) -> db::Result<ExportBundle> {
	let contributions = contributions::table
		.inner_join(members::table)
		.order((contributions::year.desc(), contributions::month.desc()))
		.select((
			members::name,
			contributions::month,
			contributions::year,
			contributions::amount,
			contributions::status,
			contributions::paid_date,
		))
		.load::<(String, i32, i32, f64, PaymentStatus, Option<Time>)>(conn)?
		.into_iter()
		.map(|(member, month, year, amount, status, paid_date)| ContributionRow {
			member,
			month,
			year,
			amount,
			status: status.to_string(),
			paid_date,
		})
		.collect();

	let installments = installments::table
		.inner_join(loans::table.inner_join(members::table))
		.order(installments::paid_date.desc())
		.select((
			members::name,
			installments::loan_id,
			installments::month_no,
			installments::amount,
			installments::status,
			installments::paid_date,
		))
		.load::<(String, Id, i32, f64, PaymentStatus, Time)>(conn)?
		.into_iter()
		.map(|(member, loan_id, month_no, amount, status, paid_date)| InstallmentRow {
			member,
			loan_id,
			month_no,
			amount,
			status: status.to_string(),
			paid_date,
		})
		.collect();

	let loans_issued = loans::table
		.inner_join(members::table)
		.order(loans::request_time.desc())
		.select((loans::all_columns, members::name))
		.load::<(Loan, String)>(conn)?
		.into_iter()
		.map(|(loan, member)| LoanIssuedRow {
			member,
			loan_id: loan.id,
			amount: loan.amount,
			interest_rate_percent: loan.interest_rate_percent,
			total_months: loan.total_months,
			status: loan.status.to_string(),
			repayment_status: loan.repayment_status.to_string(),
			request_time: loan.request_time,
			approved_time: loan.approved_time,
			closed_time: loan.closed_time,
		})
		.collect();

	Ok(ExportBundle {
		contributions,
		installments,
		loans_issued,
	})
}
