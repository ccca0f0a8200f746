use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteConnection};
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::members;
use crate::types::{Id, Time};

#[derive(Queryable, Identifiable, PartialEq, Debug)]
#[diesel(table_name = members)]
pub struct Member {
	pub id: Id,
	pub name: String,
	pub username: String,
	pub password: String,
	pub role: Role,
	pub join_date: Time,
}

impl Member {
	pub fn actor(&self) -> Actor {
		Actor { id: self.id, role: self.role }
	}
}

#[derive(Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
	pub name: &'a str,
	pub username: &'a str,
	pub password: &'a str,
	pub role: Role,
	pub join_date: Time,
}

#[derive(AsExpression, FromSqlRow, Eq, PartialEq, Clone, Copy, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
	Admin,
	Member,
}

impl ToSql<Text, Sqlite> for Role {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl<DB> FromSql<Text, DB> for Role
where
	DB: Backend,
	String: FromSql<Text, DB>,
{
	fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
		let s = String::from_sql(bytes)?;
		Ok(Role::from_str(&s)?)
	}
}

/// Caller identity, threaded into every mutating ledger operation
///
/// The session collaborator resolves credentials to an `Actor`; the core
/// only checks the role it is handed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actor {
	pub id: Id,
	pub role: Role,
}

impl Actor {
	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}
}

pub struct Repo;

impl Repo {
	pub fn create(conn: &mut SqliteConnection, new_member: NewMember) -> db::Result<Member> {
		diesel::insert_into(members::table)
			.values(&new_member)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(conn: &mut SqliteConnection, id: Id) -> db::Result<Member> {
		members::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	pub fn find_by_username(conn: &mut SqliteConnection, username: &str) -> db::Result<Member> {
		members::table
			.filter(members::username.eq(username))
			.first(conn)
			.map_err(Into::into)
	}

	/// All non-admin members, ordered by name
	pub fn members_only(conn: &mut SqliteConnection) -> db::Result<Vec<Member>> {
		members::table
			.filter(members::role.eq(Role::Member))
			.order(members::name.asc())
			.load(conn)
			.map_err(Into::into)
	}

	pub fn member_count(conn: &mut SqliteConnection) -> db::Result<i64> {
		members::table
			.filter(members::role.eq(Role::Member))
			.count()
			.get_result(conn)
			.map_err(Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn role_round_trips_through_text() {
		assert_eq!(Role::Admin.to_string(), "admin");
		assert_eq!(Role::from_str("member").unwrap(), Role::Member);
		assert!(Role::from_str("superuser").is_err());
	}
}
