//! Outgoing email.
//!
//! Only the console backend exists: each message is written to the `mail`
//! log target in full, which is enough for development and for sites that
//! relay their logs. Test builds additionally keep every message in an
//! in-memory outbox so tests can follow the links inside.

#[cfg(test)]
use std::sync::Mutex;

use log::info;
use serde::Serialize;

/// A single plain-text email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Managed mail sender.
pub struct Mailer {
    from: String,
    #[cfg(test)]
    outbox: Mutex<Vec<Email>>,
}

impl Mailer {
    /// A mailer that prints every message to the log.
    pub fn console(from: String) -> Self {
        Self {
            from,
            #[cfg(test)]
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Send a message to a single recipient.
    pub fn send(&self, to: &str, subject: &str, body: &str) {
        let email = Email {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };

        info!(
            target: "mail",
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            email.from, email.to, email.subject, email.body
        );

        #[cfg(test)]
        self.outbox
            .lock()
            .expect("outbox poisoned")
            .push(email);
    }

    /// Everything sent so far.
    #[cfg(test)]
    pub fn outbox(&self) -> Vec<Email> {
        self.outbox.lock().expect("outbox poisoned").clone()
    }
}
