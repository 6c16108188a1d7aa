use attendance_tracker::auth::Session;
use attendance_tracker::auth::flows::{SignInForm, SignUpForm, confirm_email, sign_in, sign_up};
use attendance_tracker::error::{AppError, GatewayError};
use attendance_tracker::gateway::memory::Operation;
use attendance_tracker::gateway::{MemoryGateway, Table};
use attendance_tracker::model::Role;
use attendance_tracker::utils::email_index::EmailIndex;
use serde_json::json;

fn sign_up_form(role: &str, email: &str, student_number: Option<&str>) -> SignUpForm {
    SignUpForm {
        role: role.into(),
        email: email.into(),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
        name: "Ana Reyes".into(),
        student_number: student_number.map(str::to_string),
    }
}

fn sign_in_form(role: &str, email: &str, password: &str) -> SignInForm {
    SignInForm {
        role: role.into(),
        email: email.into(),
        password: password.into(),
    }
}

#[actix_web::test]
async fn student_without_number_is_rejected_before_any_call() {
    let gw = MemoryGateway::new();
    let index = EmailIndex::new();

    let err = sign_up(&gw, &index, &sign_up_form("student", "ana@school.edu", None))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Please fill in all required fields.");
    assert!(gw.calls().is_empty());
}

#[actix_web::test]
async fn sign_up_registers_and_writes_the_account_row() {
    let gw = MemoryGateway::new();
    let index = EmailIndex::new();

    let outcome = sign_up(&gw, &index, &sign_up_form("student", "Ana@School.edu", Some("20231234")))
        .await
        .expect("sign up");

    assert_eq!(outcome.message, "Account created successfully! Please verify your email.");
    assert_eq!(outcome.redirect, "/students");
    let accounts = gw.rows(Table::Accounts);
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["email"], json!("ana@school.edu"));
    assert_eq!(accounts[0]["role"], json!("student"));

    // the index now knows the email without asking the backend
    gw.clear_calls();
    let err = sign_up(&gw, &index, &sign_up_form("teacher", "ana@school.edu", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Remote(GatewayError::DuplicateEmail)));
    assert!(gw.calls().is_empty());
}

#[actix_web::test]
async fn sign_in_requires_a_confirmed_email_and_matching_role() {
    let gw = MemoryGateway::new();
    let index = EmailIndex::new();
    sign_up(&gw, &index, &sign_up_form("teacher", "cruz@school.edu", None))
        .await
        .expect("sign up");

    let err = sign_in(&gw, &sign_in_form("teacher", "cruz@school.edu", "secret1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnconfirmedEmail));

    let err = confirm_email(&gw, "cruz@school.edu", "000000").await.unwrap_err();
    assert!(matches!(err, AppError::Remote(GatewayError::InvalidConfirmationCode)));
    assert!(matches!(
        sign_in(&gw, &sign_in_form("teacher", "cruz@school.edu", "secret1")).await,
        Err(AppError::UnconfirmedEmail)
    ));

    let code = gw.confirmation_code("cruz@school.edu").expect("code mailed at sign-up");
    let message = confirm_email(&gw, "Cruz@School.edu", &code).await.expect("confirm");
    assert_eq!(message, "Email confirmed! You can now sign in.");
    assert!(gw.confirmation_code("cruz@school.edu").is_none());

    let err = sign_in(&gw, &sign_in_form("student", "cruz@school.edu", "secret1"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Role mismatch: You cannot sign in as a student.");

    let (session, outcome) = sign_in(&gw, &sign_in_form("teacher", "cruz@school.edu", "secret1"))
        .await
        .expect("sign in");
    assert_eq!(session.role, Role::Teacher);
    assert_eq!(outcome.message, "Teacher login successful!");
    assert_eq!(outcome.redirect, "/teachers/dashboard");

    let token = session.issue("secret", 60).expect("token");
    assert_eq!(Session::load(&token, "secret").expect("load"), session);
}

#[actix_web::test]
async fn sign_in_failures_map_to_user_messages() {
    let gw = MemoryGateway::new();

    let err = sign_in(&gw, &sign_in_form("", "x@school.edu", "pw")).await.unwrap_err();
    assert_eq!(err.to_string(), "Please fill in all fields.");
    assert!(gw.calls().is_empty());

    gw.fail_next(Operation::Authenticate, GatewayError::RateLimited);
    let err = sign_in(&gw, &sign_in_form("teacher", "x@school.edu", "pw")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Too many requests made. Please try again after a few minutes."
    );

    let err = sign_in(&gw, &sign_in_form("teacher", "x@school.edu", "pw")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    // credential without an accounts row
    gw.add_credential("ghost@school.edu", "secret1", Role::Teacher, true);
    let err = sign_in(&gw, &sign_in_form("teacher", "ghost@school.edu", "secret1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound));
}

#[actix_web::test]
async fn mismatched_passwords_are_caught_locally() {
    let gw = MemoryGateway::new();
    let mut form = sign_up_form("teacher", "t@school.edu", None);
    form.confirm_password = "other".into();

    let err = sign_up(&gw, &EmailIndex::new(), &form).await.unwrap_err();
    assert_eq!(err.to_string(), "Passwords do not match!");
    assert!(gw.calls().is_empty());
}

#[actix_web::test]
async fn confirmation_codes_are_single_use() {
    let gw = MemoryGateway::new();
    sign_up(&gw, &EmailIndex::new(), &sign_up_form("student", "ben@school.edu", Some("1002")))
        .await
        .expect("sign up");
    let code = gw.confirmation_code("ben@school.edu").expect("code");

    confirm_email(&gw, "ben@school.edu", &code).await.expect("first use");
    let err = confirm_email(&gw, "ben@school.edu", &code).await.unwrap_err();
    assert!(matches!(err, AppError::Remote(GatewayError::InvalidConfirmationCode)));

    let err = confirm_email(&gw, "ben@school.edu", " ").await.unwrap_err();
    assert_eq!(err.to_string(), "Please fill in all fields.");
}
