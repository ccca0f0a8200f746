use std::env;

use diesel::sqlite::SqliteConnection;
use log::{error, info};
use warp::filters::log::Info;
use warp::Filter;

use nidhi::db;
use nidhi::ledger::Service;
use nidhi::member::{NewMember, Repo as MemberRepo, Role};

/// First-run seeding: the fund row comes from the migration, the
/// bootstrap admin account from here.
fn bootstrap_admin(conn: &mut SqliteConnection) -> db::Result<()> {
	match MemberRepo::find_by_username(conn, "admin") {
		Ok(_) => Ok(()),
		Err(db::Error::RecordNotFound) => {
			let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());
			MemberRepo::create(conn, NewMember {
				name: "Super Admin",
				username: "admin",
				password: &password,
				role: Role::Admin,
				join_date: chrono::Utc::now().naive_utc(),
			})?;
			info!("bootstrap admin account created");
			Ok(())
		}
		Err(e) => Err(e),
	}
}

#[tokio::main]
async fn main() {
	if env::var("RUST_LOG").is_err() {
		env::set_var("RUST_LOG", "info");
	}
	pretty_env_logger::init();

	let pool = db::sqlite_connection();
	{
		let conn = &mut pool.get().expect("get a db connection");
		db::run_migrations(conn).expect("run migrations");
		bootstrap_admin(conn).expect("seed admin account");
	}

	let service = Service::new(pool);

	let log = warp::log::custom(|info: Info| {
		info!(
			target: "nidhi::api",
			"\"{} {} {:?}\" \t{} {} {:?}",
			info.method(),
			info.path(),
			info.version(),
			info.status().canonical_reason().unwrap_or_else(|| "-"),
			info.status().as_u16(),
			info.elapsed(),
		);
	});

	let summary = warp::get()
		.and(warp::path("summary"))
		.and(warp::path::end())
		.map(move || match service.fund_summary() {
			Ok(summary) => warp::reply::with_status(
				warp::reply::json(&summary),
				warp::http::StatusCode::OK,
			),
			Err(e) => {
				error!("fund summary: {}", e);
				warp::reply::with_status(
					warp::reply::json(&serde_json::json!({ "error": "internal error" })),
					warp::http::StatusCode::INTERNAL_SERVER_ERROR,
				)
			}
		});

	let routes = summary.with(log);
	warp::serve(routes).run(([127, 0, 0, 1], 3030)).await;
}
