//! Reducing-balance installment math.
//!
//! Loans amortize with an equal principal share every month; interest
//! accrues on the principal still outstanding at the start of the month.
//! This is not an equal-EMI annuity: the total due decreases month over
//! month. All amounts are `f64`, the same representation the store uses.

/// One month's obligation on a loan
#[derive(Debug, Clone, PartialEq)]
pub struct Emi {
	pub month_no: u32,
	pub principal_share: f64,
	pub interest_due: f64,
	pub total_due: f64,
	pub remaining_at_start: f64,
}

/// Derive the installment due for `month_no` (1-based).
///
/// Returns `None` once `month_no` falls outside the loan's term, which
/// signals that the loan carries no further obligation.
pub fn compute_installment(principal: f64, total_months: u32, rate_percent: f64, month_no: u32) -> Option<Emi> {
	if month_no == 0 || total_months == 0 || month_no > total_months {
		return None;
	}

	let principal_share = principal / total_months as f64;
	let remaining_at_start = remaining_at_month_start(principal, principal_share, month_no);
	let interest_due = remaining_at_start * rate_percent / 100.0;

	Some(Emi {
		month_no,
		principal_share,
		interest_due,
		total_due: principal_share + interest_due,
		remaining_at_start,
	})
}

/// Principal still owed after `months_paid` equal principal repayments,
/// floored at zero.
pub fn outstanding_principal(principal: f64, total_months: u32, months_paid: u32) -> f64 {
	if total_months == 0 {
		return 0.0;
	}
	let principal_share = principal / total_months as f64;
	(principal - principal_share * months_paid as f64).max(0.0)
}

/// Interest component of a single paid installment, re-derived from the
/// loan's original terms.
///
/// Installment rows do not persist their principal/interest split, so the
/// interest-earned aggregate re-runs this formula over every paid row. The
/// floor keeps a corrupt `month_no` beyond the term from producing a
/// negative base.
pub fn interest_component(principal: f64, total_months: u32, rate_percent: f64, month_no: u32) -> f64 {
	if month_no == 0 || total_months == 0 {
		return 0.0;
	}
	let principal_share = principal / total_months as f64;
	remaining_at_month_start(principal, principal_share, month_no) * rate_percent / 100.0
}

fn remaining_at_month_start(principal: f64, principal_share: f64, month_no: u32) -> f64 {
	(principal - principal_share * (month_no - 1) as f64).max(0.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	// 10000 over 5 months at 1%/month: the worked example from the
	// original fund's records.
	#[test]
	fn five_month_schedule() {
		let want = [
			(10000.0, 100.0, 2100.0),
			(8000.0, 80.0, 2080.0),
			(6000.0, 60.0, 2060.0),
			(4000.0, 40.0, 2040.0),
			(2000.0, 20.0, 2020.0),
		];

		for (i, (remaining, interest, total)) in want.iter().enumerate() {
			let month_no = i as u32 + 1;
			let emi = compute_installment(10000.0, 5, 1.0, month_no).unwrap();
			assert_eq!(emi.month_no, month_no);
			assert_eq!(emi.principal_share, 2000.0);
			assert_eq!(emi.remaining_at_start, *remaining);
			assert_eq!(emi.interest_due, *interest);
			assert_eq!(emi.total_due, *total);
		}
	}

	#[test]
	fn total_due_decreases_monotonically() {
		let mut prev = f64::MAX;
		for month_no in 1..=12 {
			let emi = compute_installment(24000.0, 12, 1.0, month_no).unwrap();
			assert!(emi.total_due < prev);
			prev = emi.total_due;
		}
	}

	#[test]
	fn principal_shares_sum_back_to_principal() {
		let cases = [(10000.0, 5), (9000.0, 12), (2500.0, 4), (100.0, 3)];
		for (principal, total_months) in cases {
			let emi = compute_installment(principal, total_months, 1.0, 1).unwrap();
			let sum = emi.principal_share * total_months as f64;
			assert!((sum - principal).abs() < 1e-9, "{} over {} months", principal, total_months);
		}
	}

	#[test]
	fn no_obligation_outside_term() {
		assert_eq!(compute_installment(10000.0, 5, 1.0, 6), None);
		assert_eq!(compute_installment(10000.0, 5, 1.0, 0), None);
		assert_eq!(compute_installment(10000.0, 0, 1.0, 1), None);
	}

	#[test]
	fn remaining_floors_at_zero() {
		// A month_no past the term can only come from corrupt data; the
		// interest base still must not go negative.
		assert_eq!(interest_component(10000.0, 5, 1.0, 9), 0.0);
		assert_eq!(outstanding_principal(10000.0, 5, 8), 0.0);
	}

	#[test]
	fn outstanding_principal_steps_down_by_share() {
		assert_eq!(outstanding_principal(10000.0, 5, 0), 10000.0);
		assert_eq!(outstanding_principal(10000.0, 5, 1), 8000.0);
		assert_eq!(outstanding_principal(10000.0, 5, 5), 0.0);
	}

	#[test]
	fn interest_component_matches_calculator() {
		for month_no in 1..=5 {
			let emi = compute_installment(10000.0, 5, 1.0, month_no).unwrap();
			assert_eq!(interest_component(10000.0, 5, 1.0, month_no), emi.interest_due);
		}
	}
}
