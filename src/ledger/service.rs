use std::sync::Arc;

use chrono::Datelike;
use diesel::sqlite::SqliteConnection;
use log::info;

use crate::contribution::{
	self, Contribution, ContributionAction, ContributionOutcome, NewContribution,
	MONTHLY_CONTRIBUTION,
};
use crate::db;
use crate::emi::{self, Emi};
use crate::export::{self, ExportBundle};
use crate::fund::{self, Fund, FundSummary};
use crate::loan::{
	self, ActiveLoan, Installment, Loan, LoanStatus, LoanTrackingRow, NewInstallment, NewLoan,
	DEFAULT_INTEREST_RATE_PERCENT,
};
use crate::member::{self, Actor, Member, NewMember, Role};
use crate::proof::{self, NewProof, PaymentProof, ProofStatus, ProofTarget, ProofType};
use crate::types::{Clock, Id, SystemClock, Time};

use super::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Members get a payment reminder on this day of the month
const ALERT_DAY_OF_MONTH: u32 = 10;

/// Service for running the cooperative's ledger
///
/// Every mutating operation takes the acting `Actor` explicitly and runs
/// inside a single immediate transaction, so admin actions racing on the
/// same loan or proof serialize at the store and no multi-row write can be
/// observed half-applied.
#[derive(Clone)]
pub struct Service {
	db: db::SqlitePool,
	clock: Arc<dyn Clock + Send + Sync>,
}

impl Service {
	pub fn new(db: db::SqlitePool) -> Self {
		Service { db, clock: Arc::new(SystemClock) }
	}

	pub fn with_clock(db: db::SqlitePool, clock: Arc<dyn Clock + Send + Sync>) -> Self {
		Service { db, clock }
	}

	pub fn add_member(&self, actor: &Actor, name: &str, username: &str, password: &str) -> Result<Member> {
		require_admin(actor, "add member")?;
		if name.trim().is_empty() || username.trim().is_empty() {
			return Err(Error::validation("name and username must be non-empty"));
		}

		let join_date = self.clock.now();
		let conn = &mut self.db.get()?;
		let new_member = NewMember {
			name,
			username,
			password,
			role: Role::Member,
			join_date,
		};

		let member = member::Repo::create(conn, new_member).map_err(|e| match e {
			db::Error::RecordAlreadyExists => {
				Error::validation(format!("username '{}' is already taken", username))
			}
			e => Error::from(e),
		})?;

		info!("member {} ({}) added", member.id, member.username);
		Ok(member)
	}

	/// File a loan request on behalf of the acting member. The stored EMI
	/// figures are a snapshot of the first month's split; repayment math
	/// always goes back through the calculator.
	pub fn request_loan(&self, actor: &Actor, amount: f64, months: u32) -> Result<Loan> {
		require_member(actor, "request a loan")?;
		if !amount.is_finite() || amount <= 0.0 {
			return Err(Error::validation(format!("loan amount must be positive, got {}", amount)));
		}
		let snapshot = match emi::compute_installment(amount, months, DEFAULT_INTEREST_RATE_PERCENT, 1) {
			Some(emi) => emi,
			None => return Err(Error::validation("loan term must be at least one month")),
		};

		let request_time = self.clock.now();
		let conn = &mut self.db.get()?;
		let loan = loan::Repo::create(conn, NewLoan {
			member_id: actor.id,
			amount,
			interest_rate_percent: DEFAULT_INTEREST_RATE_PERCENT,
			total_months: months as i32,
			status: LoanStatus::Pending,
			repayment_status: loan::RepaymentStatus::Open,
			request_time,
			emi_amount: snapshot.total_due,
			principal_portion: snapshot.principal_share,
			interest_portion: snapshot.interest_due,
		})?;

		info!("loan {} requested by member {}: {} over {} months", loan.id, actor.id, amount, months);
		Ok(loan)
	}

	pub fn approve_loan(&self, actor: &Actor, loan_id: Id) -> Result<Loan> {
		require_admin(actor, "approve a loan")?;

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<Loan, Error, _>(|conn| {
			let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
			if loan.status != LoanStatus::Pending {
				return Err(Error::state_conflict(format!(
					"loan {} is already {}", loan_id, loan.status
				)));
			}

			let loan = loan::Repo::set_approved(conn, loan_id, now)?;
			info!("loan {} approved for member {}", loan.id, loan.member_id);
			Ok(loan)
		})
	}

	pub fn reject_loan(&self, actor: &Actor, loan_id: Id) -> Result<Loan> {
		require_admin(actor, "reject a loan")?;

		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<Loan, Error, _>(|conn| {
			let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
			if loan.status != LoanStatus::Pending {
				return Err(Error::state_conflict(format!(
					"loan {} is already {}", loan_id, loan.status
				)));
			}

			let loan = loan::Repo::set_rejected(conn, loan_id)?;
			info!("loan {} rejected", loan.id);
			Ok(loan)
		})
	}

	/// Record a paid installment directly, outside the proof workflow.
	///
	/// The amount is taken as given: an admin may override what the
	/// calculator would charge.
	pub fn record_installment(&self, actor: &Actor, loan_id: Id, month_no: u32, amount: f64) -> Result<Installment> {
		require_admin(actor, "record an installment")?;
		if month_no == 0 {
			return Err(Error::validation("installment month must be at least 1"));
		}
		if !amount.is_finite() || amount <= 0.0 {
			return Err(Error::validation(format!("installment amount must be positive, got {}", amount)));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<Installment, Error, _>(|conn| {
			Self::record_installment_tx(conn, loan_id, month_no, amount, now)
		})
	}

	/// Remove an installment row; an irreversible correction. A loan that
	/// auto-closed drops back to open if the paid count no longer covers
	/// the term.
	pub fn delete_installment(&self, actor: &Actor, installment_id: Id) -> Result<()> {
		require_admin(actor, "delete an installment")?;

		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<(), Error, _>(|conn| {
			let installment =
				loan::InstallmentRepo::find_by_id(conn, installment_id).map_err(missing("installment"))?;
			loan::InstallmentRepo::delete(conn, installment_id)?;

			let parent = loan::Repo::find_by_id(conn, installment.loan_id)?;
			if parent.repayment_status == loan::RepaymentStatus::Closed {
				let paid = loan::InstallmentRepo::paid_count(conn, parent.id)?;
				if paid < parent.total_months as i64 {
					loan::Repo::reopen(conn, parent.id)?;
					info!("loan {} reopened after installment {} was deleted", parent.id, installment_id);
				}
			}

			Ok(())
		})
	}

	fn record_installment_tx(conn: &mut SqliteConnection, loan_id: Id, month_no: u32, amount: f64, now: Time) -> Result<Installment> {
		let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
		if !loan.is_open() {
			return Err(Error::state_conflict(format!(
				"loan {} is not open for repayment", loan_id
			)));
		}

		let installment = loan::InstallmentRepo::create(conn, NewInstallment {
			loan_id,
			month_no: month_no as i32,
			amount,
			status: contribution::PaymentStatus::Paid,
			paid_date: now,
		})?;

		let paid = loan::InstallmentRepo::paid_count(conn, loan_id)?;
		if paid >= loan.total_months as i64 {
			loan::Repo::close(conn, loan_id, now)?;
			info!("loan {} closed after installment {} of {}", loan_id, paid, loan.total_months);
		}

		Ok(installment)
	}

	/// Mark a member's monthly dues paid or walk a payment back. Pay on a
	/// missing row inserts it as paid; unpay removes the row outright, so
	/// a pay/unpay round trip leaves no trace.
	pub fn set_contribution_status(&self, actor: &Actor, member_id: Id, month: i32, year: i32, action: ContributionAction) -> Result<ContributionOutcome> {
		require_admin(actor, "update contribution status")?;
		validate_period(month, year)?;

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<ContributionOutcome, Error, _>(|conn| {
			member::Repo::find_by_id(conn, member_id).map_err(missing("member"))?;

			match action {
				ContributionAction::Pay => {
					Self::pay_contribution_tx(conn, member_id, month, year, MONTHLY_CONTRIBUTION, now)
				}
				ContributionAction::Unpay => {
					match contribution::Repo::find_for_month(conn, member_id, month, year)? {
						Some(row) => {
							contribution::Repo::delete(conn, row.id)?;
							info!("contribution {}/{} for member {} walked back", month, year, member_id);
							Ok(ContributionOutcome::Removed)
						}
						None => Ok(ContributionOutcome::NoRecord),
					}
				}
			}
		})
	}

	pub fn delete_contribution(&self, actor: &Actor, contribution_id: Id) -> Result<()> {
		require_admin(actor, "delete a contribution")?;

		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<(), Error, _>(|conn| {
			contribution::Repo::find_by_id(conn, contribution_id).map_err(missing("contribution"))?;
			contribution::Repo::delete(conn, contribution_id)?;
			Ok(())
		})
	}

	fn pay_contribution_tx(conn: &mut SqliteConnection, member_id: Id, month: i32, year: i32, amount: f64, now: Time) -> Result<ContributionOutcome> {
		match contribution::Repo::find_for_month(conn, member_id, month, year)? {
			None => {
				let row = contribution::Repo::create(conn, NewContribution {
					member_id,
					month,
					year,
					amount,
					status: contribution::PaymentStatus::Paid,
					paid_date: Some(now),
				})?;
				Ok(ContributionOutcome::Inserted(row))
			}
			Some(row) if row.status == contribution::PaymentStatus::Pending => {
				let row = contribution::Repo::mark_paid(conn, row.id, now)?;
				Ok(ContributionOutcome::Updated(row))
			}
			Some(row) => Ok(ContributionOutcome::AlreadyPaid(row)),
		}
	}

	/// File an unverified payment claim for later admin review
	pub fn submit_proof(&self, actor: &Actor, target: ProofTarget, amount: f64, screenshot_path: &str) -> Result<PaymentProof> {
		require_member(actor, "submit a payment proof")?;
		if !amount.is_finite() || amount <= 0.0 {
			return Err(Error::validation(format!("claimed amount must be positive, got {}", amount)));
		}
		if screenshot_path.trim().is_empty() {
			return Err(Error::validation("a proof needs its uploaded screenshot reference"));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<PaymentProof, Error, _>(|conn| {
			let new_proof = match target {
				ProofTarget::Emi { loan_id, month_no } => {
					if month_no == 0 {
						return Err(Error::validation("installment month must be at least 1"));
					}
					let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
					if loan.member_id != actor.id {
						return Err(Error::unauthorized("submit a proof against another member's loan"));
					}
					if !loan.is_open() {
						return Err(Error::state_conflict(format!(
							"loan {} is not open for repayment", loan_id
						)));
					}

					NewProof {
						member_id: actor.id,
						proof_type: ProofType::Emi,
						loan_id: Some(loan_id),
						month_no: Some(month_no as i32),
						month: None,
						year: None,
						amount,
						screenshot_path,
						status: ProofStatus::Pending,
						submitted_at: now,
					}
				}
				ProofTarget::Contribution { month, year } => {
					validate_period(month, year)?;

					NewProof {
						member_id: actor.id,
						proof_type: ProofType::Contribution,
						loan_id: None,
						month_no: None,
						month: Some(month),
						year: Some(year),
						amount,
						screenshot_path,
						status: ProofStatus::Pending,
						submitted_at: now,
					}
				}
			};

			let proof = proof::Repo::create(conn, new_proof)?;
			info!("proof {} submitted by member {}", proof.id, actor.id);
			Ok(proof)
		})
	}

	/// Turn a pending proof into ledger state. The ledger write and the
	/// status flip commit together: a proof can never stay re-approvable
	/// after its installment or contribution has landed.
	pub fn approve_proof(&self, actor: &Actor, proof_id: Id) -> Result<PaymentProof> {
		require_admin(actor, "approve a payment proof")?;

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<PaymentProof, Error, _>(|conn| {
			let proof = proof::Repo::find_by_id(conn, proof_id).map_err(missing("payment proof"))?;
			if proof.status != ProofStatus::Pending {
				return Err(Error::state_conflict(format!(
					"proof {} has already been {}", proof_id, proof.status
				)));
			}

			let target = proof.target().ok_or_else(|| {
				Error::state_conflict(format!("proof {} does not name a usable target", proof_id))
			})?;

			match target {
				ProofTarget::Emi { loan_id, month_no } => {
					Self::record_installment_tx(conn, loan_id, month_no, proof.amount, now)?;
				}
				ProofTarget::Contribution { month, year } => {
					Self::pay_contribution_tx(conn, proof.member_id, month, year, proof.amount, now)?;
				}
			}

			let proof = proof::Repo::set_approved(conn, proof_id, now)?;
			info!("proof {} approved", proof.id);
			Ok(proof)
		})
	}

	pub fn reject_proof(&self, actor: &Actor, proof_id: Id, notes: &str) -> Result<PaymentProof> {
		require_admin(actor, "reject a payment proof")?;

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		conn.immediate_transaction::<PaymentProof, Error, _>(|conn| {
			let proof = proof::Repo::find_by_id(conn, proof_id).map_err(missing("payment proof"))?;
			if proof.status != ProofStatus::Pending {
				return Err(Error::state_conflict(format!(
					"proof {} has already been {}", proof_id, proof.status
				)));
			}

			let proof = proof::Repo::set_rejected(conn, proof_id, now, notes)?;
			info!("proof {} rejected", proof.id);
			Ok(proof)
		})
	}

	pub fn pending_proofs(&self) -> Result<Vec<PaymentProof>> {
		let conn = &mut self.db.get()?;
		proof::Repo::pending(conn).map_err(Into::into)
	}

	/// 1-based index of the next installment due
	pub fn next_due_month(&self, loan_id: Id) -> Result<u32> {
		let conn = &mut self.db.get()?;
		loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
		let paid = loan::InstallmentRepo::paid_count(conn, loan_id)?;
		Ok(paid as u32 + 1)
	}

	/// The next installment's split, or `None` when the loan is not open
	/// or the term is fully paid
	pub fn next_installment(&self, loan_id: Id) -> Result<Option<Emi>> {
		let conn = &mut self.db.get()?;
		let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
		if !loan.is_open() {
			return Ok(None);
		}

		let paid = loan::InstallmentRepo::paid_count(conn, loan_id)?;
		Ok(loan.emi_for_month(paid as u32 + 1))
	}

	pub fn outstanding_principal(&self, loan_id: Id) -> Result<f64> {
		let conn = &mut self.db.get()?;
		let loan = loan::Repo::find_by_id(conn, loan_id).map_err(missing("loan"))?;
		let paid = loan::InstallmentRepo::paid_count(conn, loan_id)?;
		Ok(loan.outstanding_after(paid as u32))
	}

	pub fn pending_loans(&self) -> Result<Vec<Loan>> {
		let conn = &mut self.db.get()?;
		loan::Repo::pending(conn).map_err(Into::into)
	}

	/// Open loans with their next-due figures, for the review board
	pub fn active_loans(&self) -> Result<Vec<ActiveLoan>> {
		let conn = &mut self.db.get()?;
		let loans = loan::Repo::active(conn)?;

		let mut rows = Vec::with_capacity(loans.len());
		for loan in loans {
			let paid = loan::InstallmentRepo::paid_count(conn, loan.id)?;
			let next_month = paid as u32 + 1;
			let next_emi = loan.emi_for_month(next_month);
			rows.push(ActiveLoan { loan, next_month, next_emi });
		}

		Ok(rows)
	}

	pub fn loan_tracking(&self) -> Result<Vec<LoanTrackingRow>> {
		let conn = &mut self.db.get()?;
		loan::Repo::tracking_rows(conn).map_err(Into::into)
	}

	pub fn fund_summary(&self) -> Result<FundSummary> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		fund::summary(conn, now.month() as i32, now.year()).map_err(Into::into)
	}

	/// Adjust the fund's opening balance; the only persisted fund figure
	pub fn set_seed_balance(&self, actor: &Actor, seed_balance: f64) -> Result<Fund> {
		require_admin(actor, "edit the fund seed balance")?;
		if !seed_balance.is_finite() || seed_balance < 0.0 {
			return Err(Error::validation(format!("seed balance must be non-negative, got {}", seed_balance)));
		}

		let conn = &mut self.db.get()?;
		fund::Repo::set_seed_balance(conn, seed_balance).map_err(Into::into)
	}

	/// Member-by-month grid for one year; always twelve cells per member
	pub fn contribution_matrix(&self, year: i32) -> Result<Vec<contribution::MemberYearRow>> {
		validate_year(year)?;

		let conn = &mut self.db.get()?;
		let members = member::Repo::members_only(conn)?;
		let rows = contribution::Repo::for_year(conn, year)?;
		Ok(contribution::yearly_matrix(&members, &rows))
	}

	/// The three row-sets the spreadsheet collaborator renders
	pub fn export_rows(&self) -> Result<ExportBundle> {
		let conn = &mut self.db.get()?;
		export::collect(conn).map_err(Into::into)
	}

	pub fn member_dashboard(&self, member_id: Id) -> Result<MemberDashboard> {
		let conn = &mut self.db.get()?;
		member::Repo::find_by_id(conn, member_id).map_err(missing("member"))?;

		let loans = loan::Repo::for_member(conn, member_id)?;
		let contributions = contribution::Repo::for_member(conn, member_id)?;
		let total_savings = contribution::Repo::paid_total_for_member(conn, member_id)?;

		let mut active_loan_principal = 0.0;
		let mut open_loans = Vec::new();
		for loan in loans.iter().filter(|l| l.is_open()) {
			active_loan_principal += loan.amount;
			let paid = loan::InstallmentRepo::paid_count(conn, loan.id)?;
			let next_month = paid as u32 + 1;
			open_loans.push(ActiveLoan {
				loan: loan.clone(),
				next_month,
				next_emi: loan.emi_for_month(next_month),
			});
		}

		Ok(MemberDashboard {
			total_savings,
			active_loan_principal,
			open_loans,
			loans,
			contributions,
		})
	}

	/// Reminders surfaced to a member on the 10th of the month: unpaid
	/// current-month dues, and principal still outstanding on open loans.
	pub fn payment_alerts(&self, member_id: Id) -> Result<Vec<Alert>> {
		let today = self.clock.now();
		if today.day() != ALERT_DAY_OF_MONTH {
			return Ok(Vec::new());
		}

		let conn = &mut self.db.get()?;
		member::Repo::find_by_id(conn, member_id).map_err(missing("member"))?;

		let mut alerts = Vec::new();
		let (month, year) = (today.month() as i32, today.year());
		if !contribution::Repo::is_paid_for_month(conn, member_id, month, year)? {
			alerts.push(Alert::ContributionDue { month, year });
		}

		let mut outstanding = 0.0;
		for loan in loan::Repo::for_member(conn, member_id)?.iter().filter(|l| l.is_open()) {
			let paid = loan::InstallmentRepo::paid_count(conn, loan.id)?;
			outstanding += loan.outstanding_after(paid as u32);
		}
		if outstanding > 0.0 {
			alerts.push(Alert::OutstandingBalance { total: outstanding });
		}

		Ok(alerts)
	}
}

/// A member's view of their own ledger position
#[derive(Debug)]
pub struct MemberDashboard {
	pub total_savings: f64,
	pub active_loan_principal: f64,
	pub open_loans: Vec<ActiveLoan>,
	pub loans: Vec<Loan>,
	pub contributions: Vec<Contribution>,
}

#[derive(Debug, PartialEq)]
pub enum Alert {
	ContributionDue { month: i32, year: i32 },
	OutstandingBalance { total: f64 },
}

fn require_admin(actor: &Actor, operation: &'static str) -> Result<()> {
	if actor.is_admin() {
		Ok(())
	} else {
		Err(Error::unauthorized(operation))
	}
}

fn require_member(actor: &Actor, operation: &'static str) -> Result<()> {
	if actor.role == Role::Member {
		Ok(())
	} else {
		Err(Error::unauthorized(operation))
	}
}

fn validate_period(month: i32, year: i32) -> Result<()> {
	if !(1..=12).contains(&month) {
		return Err(Error::validation(format!("month {} out of range 1..=12", month)));
	}
	validate_year(year)
}

fn validate_year(year: i32) -> Result<()> {
	if !(2000..=2100).contains(&year) {
		return Err(Error::validation(format!("year {} out of range", year)));
	}
	Ok(())
}

fn missing(entity: &'static str) -> impl Fn(db::Error) -> Error {
	move |e| match e {
		db::Error::RecordNotFound => Error::not_found(entity),
		e => Error::from(e),
	}
}
