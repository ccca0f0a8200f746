use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteConnection};
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::payment_proofs;
use crate::types::{Id, Time};

/// A member's unverified claim of an off-system payment: an uploaded
/// screenshot plus the figure they say they paid. Nothing touches the
/// ledger until an admin reviews it.
#[derive(Queryable, Identifiable, PartialEq, Debug)]
#[diesel(table_name = payment_proofs)]
pub struct PaymentProof {
	pub id: Id,
	pub member_id: Id,
	pub proof_type: ProofType,
	pub loan_id: Option<Id>,
	pub month_no: Option<i32>,
	pub month: Option<i32>,
	pub year: Option<i32>,
	pub amount: f64,
	pub screenshot_path: String,
	pub status: ProofStatus,
	pub submitted_at: Time,
	pub reviewed_at: Option<Time>,
	pub admin_notes: Option<String>,
}

impl PaymentProof {
	/// Reassemble the typed target from the nullable columns. `None`
	/// means the row is malformed for its declared type.
	pub fn target(&self) -> Option<ProofTarget> {
		match self.proof_type {
			ProofType::Emi => match (self.loan_id, self.month_no) {
				(Some(loan_id), Some(month_no)) if month_no > 0 => {
					Some(ProofTarget::Emi { loan_id, month_no: month_no as u32 })
				}
				_ => None,
			},
			ProofType::Contribution => match (self.month, self.year) {
				(Some(month), Some(year)) if (1..=12).contains(&month) => {
					Some(ProofTarget::Contribution { month, year })
				}
				_ => None,
			},
		}
	}
}

#[derive(Insertable)]
#[diesel(table_name = payment_proofs)]
pub struct NewProof<'a> {
	pub member_id: Id,
	pub proof_type: ProofType,
	pub loan_id: Option<Id>,
	pub month_no: Option<i32>,
	pub month: Option<i32>,
	pub year: Option<i32>,
	pub amount: f64,
	pub screenshot_path: &'a str,
	pub status: ProofStatus,
	pub submitted_at: Time,
}

#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum ProofType {
	Emi,
	Contribution,
}

#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum ProofStatus {
	Pending,
	Approved,
	Rejected,
}

/// What a proof claims to settle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProofTarget {
	Emi { loan_id: Id, month_no: u32 },
	Contribution { month: i32, year: i32 },
}

impl ToSql<Text, Sqlite> for ProofType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for ProofType
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(ProofType::from_str(&s)?)
	}
}

impl ToSql<Text, Sqlite> for ProofStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for ProofStatus
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(ProofStatus::from_str(&s)?)
	}
}

pub struct Repo;

impl Repo {
	pub fn create(conn: &mut SqliteConnection, new_proof: NewProof) -> db::Result<PaymentProof> {
		diesel::insert_into(payment_proofs::table)
			.values(&new_proof)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(conn: &mut SqliteConnection, id: Id) -> db::Result<PaymentProof> {
		payment_proofs::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	/// The review queue, newest submission first
	pub fn pending(conn: &mut SqliteConnection) -> db::Result<Vec<PaymentProof>> {
		payment_proofs::table
			.filter(payment_proofs::status.eq(ProofStatus::Pending))
			.order(payment_proofs::submitted_at.desc())
			.load(conn)
			.map_err(Into::into)
	}

	pub fn for_member(conn: &mut SqliteConnection, member_id: Id) -> db::Result<Vec<PaymentProof>> {
		payment_proofs::table
			.filter(payment_proofs::member_id.eq(member_id))
			.order(payment_proofs::submitted_at.desc())
			.load(conn)
			.map_err(Into::into)
	}

	pub fn set_approved(conn: &mut SqliteConnection, id: Id, reviewed_at: Time) -> db::Result<PaymentProof> {
		diesel::update(payment_proofs::table)
			.filter(payment_proofs::id.eq(id))
			.set((
				payment_proofs::status.eq(ProofStatus::Approved),
				payment_proofs::reviewed_at.eq(Some(reviewed_at)),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}

	pub fn set_rejected(conn: &mut SqliteConnection, id: Id, reviewed_at: Time, notes: &str) -> db::Result<PaymentProof> {
		diesel::update(payment_proofs::table)
			.filter(payment_proofs::id.eq(id))
			.set((
				payment_proofs::status.eq(ProofStatus::Rejected),
				payment_proofs::reviewed_at.eq(Some(reviewed_at)),
				payment_proofs::admin_notes.eq(Some(notes)),
			))
			.execute(conn)?;

		Self::find_by_id(conn, id)
	}
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	fn proof(proof_type: ProofType, loan_id: Option<Id>, month_no: Option<i32>, month: Option<i32>, year: Option<i32>) -> PaymentProof {
		PaymentProof {
			id: 1,
			member_id: 2,
			proof_type,
			loan_id,
			month_no,
			month,
			year,
			amount: 200.0,
			screenshot_path: "uploads/p.png".to_string(),
			status: ProofStatus::Pending,
			submitted_at: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap().and_hms_opt(9, 0, 0).unwrap(),
			reviewed_at: None,
			admin_notes: None,
		}
	}

	#[test]
	fn target_reassembles_from_columns() {
		let emi = proof(ProofType::Emi, Some(9), Some(3), None, None);
		assert_eq!(emi.target(), Some(ProofTarget::Emi { loan_id: 9, month_no: 3 }));

		let contribution = proof(ProofType::Contribution, None, None, Some(5), Some(2026));
		assert_eq!(contribution.target(), Some(ProofTarget::Contribution { month: 5, year: 2026 }));
	}

	#[test]
	fn malformed_rows_have_no_target() {
		assert_eq!(proof(ProofType::Emi, Some(9), None, None, None).target(), None);
		assert_eq!(proof(ProofType::Emi, Some(9), Some(0), None, None).target(), None);
		assert_eq!(proof(ProofType::Contribution, None, None, Some(13), Some(2026)).target(), None);
		assert_eq!(proof(ProofType::Contribution, None, None, None, Some(2026)).target(), None);
	}
}
