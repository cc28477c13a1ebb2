use std::fmt::Display;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use reqwest::Error as HttpError;
use rocket::{
    http::Status,
    response::{Redirect, Responder},
    Request,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("{1}")]
    Status(Status, String),
    /// The visitor must sign in (as someone allowed) before seeing the contained path.
    #[error("Login required for {0}")]
    LoginRequired(String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {what}"))
    }

    pub fn bad_request(why: impl Display) -> Self {
        Self::Status(Status::BadRequest, format!("Bad request: {why}"))
    }

    pub fn internal(why: impl Display) -> Self {
        Self::Status(Status::InternalServerError, why.to_string())
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::LoginRequired(next) => {
                debug!("Redirecting to login before {next}");
                return Redirect::to(uri!(crate::api::auth::login_page(Some(next))))
                    .respond_to(req);
            }
            Self::Status(status, ref msg) => {
                if status.code >= 500 {
                    error!("{msg}");
                } else {
                    debug!("{msg}");
                }
                status
            }
            Self::Db(ref e) => {
                error!("Database error: {e}");
                Status::InternalServerError
            }
            Self::Http(ref e) => {
                error!("Identity provider error: {e}");
                Status::BadGateway
            }
            Self::Jwt(ref e) => match e.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Argon2(ref e) => {
                error!("Password hashing failed: {e}");
                Status::InternalServerError
            }
        };
        Err(status)
    }
}
