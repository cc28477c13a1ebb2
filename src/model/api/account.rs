//! Page content for the account views.

use serde::Serialize;

use crate::model::api::forms::{FormErrors, LoginForm, RegisterForm};

pub const LOGIN_TEMPLATE: &str = "polls/login.html";
pub const REGISTER_TEMPLATE: &str = "polls/register.html";
pub const ACTIVATION_SUCCESS_TEMPLATE: &str = "polls/account_activation_success.html";
pub const ACTIVATION_FAILURE_TEMPLATE: &str = "polls/account_activation_failure.html";

pub const INVALID_LOGIN: &str = "Invalid username or password.";
pub const INVALID_REGISTRATION: &str = "Unsuccessful registration. Invalid information.";
pub const ACTIVATED: &str = "Your account has been activated! You can now log in.";
pub const ACTIVATION_FAILED: &str = "Activation link is invalid or has expired.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "A user with that email already exists.";

#[derive(Debug, Default, Serialize)]
pub struct LoginContent {
    pub login_form: LoginForm,
    /// Where to go after signing in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RegisterContent {
    pub register_form: RegisterForm,
    pub errors: FormErrors,
}

#[derive(Debug, Serialize)]
pub struct ActivationContent {
    pub activated: bool,
}
