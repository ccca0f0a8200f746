diesel::table! {
    members (id) {
        id -> Integer,
        name -> Text,
        username -> Text,
        password -> Text,
        role -> Text,
        join_date -> Timestamp,
    }
}

diesel::table! {
    loans (id) {
        id -> Integer,
        member_id -> Integer,
        amount -> Double,
        interest_rate_percent -> Double,
        total_months -> Integer,
        status -> Text,
        repayment_status -> Text,
        request_time -> Timestamp,
        approved_time -> Nullable<Timestamp>,
        closed_time -> Nullable<Timestamp>,
        emi_amount -> Double,
        principal_portion -> Double,
        interest_portion -> Double,
    }
}

diesel::table! {
    installments (id) {
        id -> Integer,
        loan_id -> Integer,
        month_no -> Integer,
        amount -> Double,
        status -> Text,
        paid_date -> Timestamp,
    }
}

diesel::table! {
    contributions (id) {
        id -> Integer,
        member_id -> Integer,
        month -> Integer,
        year -> Integer,
        amount -> Double,
        status -> Text,
        paid_date -> Nullable<Timestamp>,
    }
}

diesel::table! {
    payment_proofs (id) {
        id -> Integer,
        member_id -> Integer,
        proof_type -> Text,
        loan_id -> Nullable<Integer>,
        month_no -> Nullable<Integer>,
        month -> Nullable<Integer>,
        year -> Nullable<Integer>,
        amount -> Double,
        screenshot_path -> Text,
        status -> Text,
        submitted_at -> Timestamp,
        reviewed_at -> Nullable<Timestamp>,
        admin_notes -> Nullable<Text>,
    }
}

diesel::table! {
    fund (id) {
        id -> Integer,
        seed_balance -> Double,
    }
}

diesel::joinable!(loans -> members (member_id));
diesel::joinable!(installments -> loans (loan_id));
diesel::joinable!(contributions -> members (member_id));
diesel::joinable!(payment_proofs -> members (member_id));
diesel::joinable!(payment_proofs -> loans (loan_id));

diesel::allow_tables_to_appear_in_same_query!(
    members,
    loans,
    installments,
    contributions,
    payment_proofs,
    fund,
);
