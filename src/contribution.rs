use std::collections::HashMap;
use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteConnection};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::member::Member;
use crate::schema::contributions;
use crate::types::{Id, Time};

/// Fixed monthly dues, in currency units
pub const MONTHLY_CONTRIBUTION: f64 = 200.0;

/// A member's fixed monthly savings record, keyed by (member, month, year)
#[derive(Queryable, Identifiable, PartialEq, Debug)]
#[diesel(table_name = contributions)]
pub struct Contribution {
	pub id: Id,
	pub member_id: Id,
	pub month: i32,
	pub year: i32,
	pub amount: f64,
	pub status: PaymentStatus,
	pub paid_date: Option<Time>,
}

#[derive(Insertable)]
#[diesel(table_name = contributions)]
pub struct NewContribution {
	pub member_id: Id,
	pub month: i32,
	pub year: i32,
	pub amount: f64,
	pub status: PaymentStatus,
	pub paid_date: Option<Time>,
}

/// Settlement state shared by contributions and loan installments
#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Paid,
}

impl ToSql<Text, Sqlite> for PaymentStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for PaymentStatus
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(PaymentStatus::from_str(&s)?)
	}
}

/// What a pay/unpay request actually did to the ledger, so callers can
/// tell an insert from an update from a no-op.
#[derive(Debug, PartialEq)]
pub enum ContributionOutcome {
	/// No row existed; one was inserted as paid
	Inserted(Contribution),
	/// A pending row was settled
	Updated(Contribution),
	/// The month was already paid; nothing written
	AlreadyPaid(Contribution),
	/// Unpay removed the row
	Removed,
	/// Unpay on a month with no record; nothing written
	NoRecord,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContributionAction {
	Pay,
	Unpay,
}

pub struct Repo;

impl Repo {
	pub fn create(conn: &mut SqliteConnection, new_contribution: NewContribution) -> db::Result<Contribution> {
		diesel::insert_into(contributions::table)
			.values(&new_contribution)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(conn: &mut SqliteConnection, id: Id) -> db::Result<Contribution> {
		contributions::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	pub fn find_for_month(conn: &mut SqliteConnection, member_id: Id, month: i32, year: i32) -> db::Result<Option<Contribution>> {
		contributions::table
			.filter(contributions::member_id.eq(member_id))
			.filter(contributions::month.eq(month))
			.filter(contributions::year.eq(year))
			.first(conn)
			.optional()
			.map_err(Into::into)
	}

	pub fn for_member(conn: &mut SqliteConnection, member_id: Id) -> db::Result<Vec<Contribution>> {
		contributions::table
			.filter(contributions::member_id.eq(member_id))
			.order((contributions::year.desc(), contributions::month.desc()))
			.load(conn)
			.map_err(Into::into)
	}

	pub fn for_year(conn: &mut SqliteConnection, year: i32) -> db::Result<Vec<Contribution>> {
		contributions::table
			.filter(contributions::year.eq(year))
			.load(conn)
			.map_err(Into::into)
	}

	pub fn mark_paid(conn: &mut SqliteConnection, id: Id, paid_date: Time) -> db::Result<Contribution> {
		diesel::update(contributions::table)
			.filter(contributions::id.eq(id))
			.set((
				contributions::status.eq(PaymentStatus::Paid),
				contributions::paid_date.eq(Some(paid_date)),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	pub fn delete(conn: &mut SqliteConnection, id: Id) -> db::Result<usize> {
		diesel::delete(contributions::table.filter(contributions::id.eq(id)))
			.execute(conn)
			.map_err(Into::into)
	}

	/// A member's lifetime savings: the sum of their paid contributions
	pub fn paid_total_for_member(conn: &mut SqliteConnection, member_id: Id) -> db::Result<f64> {
		use diesel::dsl::sum;

		contributions::table
			.filter(contributions::member_id.eq(member_id))
			.filter(contributions::status.eq(PaymentStatus::Paid))
			.select(sum(contributions::amount))
			.first::<Option<f64>>(conn)
			.map(|total| total.unwrap_or(0.0))
			.map_err(Into::into)
	}

	/// True if the member has a paid contribution for the given month
	pub fn is_paid_for_month(conn: &mut SqliteConnection, member_id: Id, month: i32, year: i32) -> db::Result<bool> {
		Self::find_for_month(conn, member_id, month, year)
			.map(|row| matches!(row, Some(c) if c.status == PaymentStatus::Paid))
	}
}

/// One cell of the yearly tracking matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCell {
	pub status: String,
	pub amount: f64,
	pub paid_date: Option<Time>,
}

/// A member's row in the yearly tracking matrix: exactly twelve cells,
/// whether or not any contribution rows exist.
#[derive(Debug, Serialize)]
pub struct MemberYearRow {
	pub member_id: Id,
	pub name: String,
	pub months: Vec<MonthCell>,
}

/// Assemble the member-by-month matrix for one year. Months without a
/// stored row default to pending with a zero amount.
pub fn yearly_matrix(members: &[Member], rows: &[Contribution]) -> Vec<MemberYearRow> {
	let by_member_month: HashMap<(Id, i32), &Contribution> = rows
		.iter()
		.map(|c| ((c.member_id, c.month), c))
		.collect();

	members
		.iter()
		.map(|member| MemberYearRow {
			member_id: member.id,
			name: member.name.clone(),
			months: (1..=12)
				.map(|month| match by_member_month.get(&(member.id, month)) {
					Some(c) => MonthCell {
						status: c.status.to_string(),
						amount: c.amount,
						paid_date: c.paid_date,
					},
					None => MonthCell {
						status: PaymentStatus::Pending.to_string(),
						amount: 0.0,
						paid_date: None,
					},
				})
				.collect(),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use crate::member::Role;
	use crate::testutil::Fixture;

	use super::*;

	fn paid_at(year: i32, month: u32, day: u32) -> Time {
		NaiveDate::from_ymd_opt(year, month, day)
			.unwrap()
			.and_hms_opt(12, 0, 0)
			.unwrap()
	}

	#[test]
	fn matrix_always_has_twelve_cells() {
		let members = vec![
			Member {
				id: 1,
				name: "Asha".to_string(),
				username: "asha".to_string(),
				password: "x".to_string(),
				role: Role::Member,
				join_date: paid_at(2026, 1, 1),
			},
		];
		let rows = vec![
			Contribution {
				id: 7,
				member_id: 1,
				month: 3,
				year: 2026,
				amount: MONTHLY_CONTRIBUTION,
				status: PaymentStatus::Paid,
				paid_date: Some(paid_at(2026, 3, 9)),
			},
		];

		let matrix = yearly_matrix(&members, &rows);
		assert_eq!(matrix.len(), 1);
		assert_eq!(matrix[0].months.len(), 12);

		let march = &matrix[0].months[2];
		assert_eq!(march.status, "paid");
		assert_eq!(march.amount, MONTHLY_CONTRIBUTION);

		let april = &matrix[0].months[3];
		assert_eq!(april.status, "pending");
		assert_eq!(april.amount, 0.0);
		assert_eq!(april.paid_date, None);
	}

	#[test]
	fn find_for_month_distinguishes_absent_from_pending() {
		let f = Fixture::new();
		let conn = &mut f.conn();
		let asha = f.member_factory.asha();

		assert_eq!(Repo::find_for_month(conn, asha.id, 4, 2026).unwrap(), None);

		let row = Repo::create(conn, NewContribution {
			member_id: asha.id,
			month: 4,
			year: 2026,
			amount: MONTHLY_CONTRIBUTION,
			status: PaymentStatus::Pending,
			paid_date: None,
		}).unwrap();

		let found = Repo::find_for_month(conn, asha.id, 4, 2026).unwrap().unwrap();
		assert_eq!(found, row);
		assert!(!Repo::is_paid_for_month(conn, asha.id, 4, 2026).unwrap());

		Repo::mark_paid(conn, row.id, paid_at(2026, 4, 10)).unwrap();
		assert!(Repo::is_paid_for_month(conn, asha.id, 4, 2026).unwrap());
	}
}
