//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are auto-incremented integers, or MongoDB's own format where no public ID is needed.
//! - Datetimes are serialised in MongoDB's own format.

mod choice;
pub use choice::{Choice, ChoiceId};

mod question;
pub use question::{Question, QuestionId};

mod social_account;
pub use social_account::SocialAccount;

mod user;
pub use user::{NewUser, User, UserId};
#[cfg(test)]
pub use user::{EXAMPLE_MEMBER_PASSWORD, EXAMPLE_STAFF_PASSWORD};
