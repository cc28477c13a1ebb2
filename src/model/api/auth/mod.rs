mod activation;
mod token;

pub use activation::{decode_uid, encode_uid, ActivationTokens};
pub use token::{AuthToken, Staff, AUTH_TOKEN_COOKIE};
