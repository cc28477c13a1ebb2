use rand::seq::SliceRandom;
use rocket::request::{FromRequest, Outcome, Request};
use serde::Serialize;

/// Taglines shown in the page header.
pub const SLOGANS: [&str; 5] = [
    "Polls or Trolls: Without your choice, beware the gremlins' voice!",
    "Polls or Spooks: Don't let phantoms choose your folks!",
    "Polls or Ghouls: Vote or let the underworld fool!",
    "Polls or Wraiths: Make a choice or invite spectral straits!",
    "Polls or Shadows: Without your say, darkness grows!",
];

/// A slogan picked at random for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Slogan(&'static str);

impl Slogan {
    pub fn random() -> Self {
        Self(SLOGANS.choose(&mut rand::thread_rng()).copied().unwrap_or(SLOGANS[0]))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Slogan {
    type Error = ();

    async fn from_request(_req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(Slogan::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_from_the_list() {
        for _ in 0..50 {
            assert!(SLOGANS.contains(&Slogan::random().as_str()));
        }
    }

    #[test]
    fn eventually_varies() {
        let first = Slogan::random();
        assert!((0..200).any(|_| Slogan::random() != first));
    }
}
