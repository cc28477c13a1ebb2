//! Submitted forms and their validation.
//!
//! Every field is optional on the wire so that a bad submission can always be
//! re-rendered with per-field errors instead of being rejected outright.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;

use crate::model::db::ChoiceId;

pub const QUESTION_TEXT_MAX: usize = 200;
pub const CHOICE_TEXT_MAX: usize = 200;
pub const USERNAME_MAX: usize = 150;
pub const PASSWORD_MIN: usize = 8;

const REQUIRED: &str = "This field is required.";

/// Errors keyed by field name. Errors not tied to a field go under `__all__`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    pub const ALL: &'static str = "__all__";

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    fn into_result<T>(self, valid: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(valid())
        } else {
            Err(self)
        }
    }
}

fn too_long(max: usize, len: usize) -> String {
    format!("Ensure this value has at most {max} characters (it has {len}).")
}

/// Trimmed value of an optional field, or `None` if it is missing or blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The new/edit poll form.
#[derive(Debug, Clone, Default, FromForm, Serialize)]
pub struct QuestionForm {
    pub question_text: Option<String>,
    /// Either RFC 3339 or an HTML `datetime-local` value, taken as UTC.
    /// Blank means now.
    pub pub_date: Option<String>,
    /// Only read when creating a poll. Blank entries are skipped.
    pub choices: Vec<String>,
}

/// A [`QuestionForm`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQuestion {
    pub question_text: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub choices: Vec<String>,
}

impl QuestionForm {
    pub fn validate(&self) -> Result<ValidQuestion, FormErrors> {
        let mut errors = FormErrors::default();

        let question_text = present(&self.question_text).unwrap_or_default();
        let len = question_text.chars().count();
        if len == 0 {
            errors.add("question_text", REQUIRED);
        } else if len > QUESTION_TEXT_MAX {
            errors.add("question_text", too_long(QUESTION_TEXT_MAX, len));
        }

        let pub_date = match present(&self.pub_date) {
            None => None,
            Some(raw) => {
                let parsed = parse_datetime(raw);
                if parsed.is_none() {
                    errors.add("pub_date", "Enter a valid date/time.");
                }
                parsed
            }
        };

        let choices: Vec<String> = self
            .choices
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        for choice in &choices {
            let len = choice.chars().count();
            if len > CHOICE_TEXT_MAX {
                errors.add("choices", too_long(CHOICE_TEXT_MAX, len));
            }
        }

        errors.into_result(|| ValidQuestion {
            question_text: question_text.to_string(),
            pub_date,
            choices,
        })
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// The vote form on a question's detail page.
#[derive(Debug, Clone, Default, FromForm)]
pub struct VoteForm {
    pub choice: Option<String>,
}

impl VoteForm {
    /// The selected choice, if one was given and looks like an ID.
    pub fn choice_id(&self) -> Option<ChoiceId> {
        present(&self.choice)?.parse().ok()
    }
}

/// The sign-in form.
#[derive(Debug, Clone, Default, FromForm, Serialize)]
pub struct LoginForm {
    /// A username, or an email address.
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl LoginForm {
    /// Both credentials, if both were given.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = present(&self.username)?;
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((username, password))
    }
}

/// The account registration form.
#[derive(Debug, Clone, Default, FromForm, Serialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub password1: Option<String>,
    #[serde(skip)]
    pub password2: Option<String>,
}

/// A [`RegisterForm`] that passed the checks that need no database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<ValidRegistration, FormErrors> {
        let mut errors = FormErrors::default();

        let username = present(&self.username).unwrap_or_default();
        let len = username.chars().count();
        if len == 0 {
            errors.add("username", REQUIRED);
        } else if len > USERNAME_MAX {
            errors.add("username", too_long(USERNAME_MAX, len));
        } else if !is_valid_username(username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let email = present(&self.email).unwrap_or_default();
        if email.is_empty() {
            errors.add("email", REQUIRED);
        } else if !is_valid_email(email) {
            errors.add("email", "Enter a valid email address.");
        }

        let password1 = self.password1.as_deref().unwrap_or_default();
        let password2 = self.password2.as_deref().unwrap_or_default();
        if password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if password2.is_empty() {
            errors.add("password2", REQUIRED);
        } else if password1 != password2 {
            errors.add("password2", "The two password fields didn't match.");
        } else {
            for problem in password_problems(password1, username, email) {
                errors.add("password2", problem);
            }
        }

        errors.into_result(|| ValidRegistration {
            username: username.to_string(),
            email: email.to_string(),
            password: password1.to_string(),
        })
    }
}

/// Letters, digits and `@.+-_`.
pub fn is_valid_username(username: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"))
        .is_match(username)
}

/// A domain label: alphanumerics, with inner hyphens allowed.
const EMAIL_LABEL: &str = r"[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?";

pub fn is_valid_email(email: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    email.len() <= 254
        && PATTERN
            .get_or_init(|| {
                let pattern = format!(r"^[^@\s]+@{EMAIL_LABEL}(?:\.{EMAIL_LABEL})+$");
                Regex::new(&pattern).expect("valid regex")
            })
            .is_match(email)
}

/// Passwords rejected outright for being too easy to guess.
const COMMON_PASSWORDS: [&str; 24] = [
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "qwertyuiop",
    "qwerty123",
    "iloveyou",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "welcome1",
    "letmein1",
    "trustno1",
    "superman",
    "starwars",
    "whatever",
    "11111111",
    "00000000",
    "abc12345",
    "passw0rd",
    "dragon12",
];

/// Everything wrong with a proposed password, given the account it is for.
pub fn password_problems(password: &str, username: &str, email: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let lowered = password.to_lowercase();

    let attributes = [
        ("username", username.to_lowercase()),
        (
            "email address",
            email.split('@').next().unwrap_or_default().to_lowercase(),
        ),
    ];
    for (name, value) in &attributes {
        let overlaps = lowered.contains(value.as_str()) || value.contains(&lowered);
        if value.chars().count() >= 3 && overlaps {
            problems.push(format!("The password is too similar to the {name}."));
            break;
        }
    }

    if password.chars().count() < PASSWORD_MIN {
        problems.push(format!(
            "This password is too short. It must contain at least {PASSWORD_MIN} characters."
        ));
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    problems
}
