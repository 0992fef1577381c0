//! Login response and handshake reply
//!
//! The client answers a [`Challenge`] with
//!
//! ```text
//! LIT:monetdb:{SHA512}9f2c...:sql:demo:
//! ```
//!
//! and the server replies with an empty prompt (logged in), an error line,
//! or redirect lines.

use crate::buffer::ReadBuffer;
use crate::config::Credentials;
use crate::constants::{endian, line};
use crate::crypto::{negotiate, password_digest, HashAlgorithm};
use crate::error::{Error, Result};

use super::challenge::Challenge;
use super::redirect::RedirectTarget;

/// The client's answer to a challenge
#[derive(Debug, Clone)]
pub struct AuthMessage {
    /// Digest algorithm chosen for this login
    pub algorithm: HashAlgorithm,
    text: String,
}

impl AuthMessage {
    /// Build the login response for `challenge`
    pub fn build(
        challenge: &Challenge,
        credentials: &Credentials,
        language: &str,
        database: &str,
        preferred: Option<HashAlgorithm>,
    ) -> Result<Self> {
        let algorithm = negotiate(&challenge.hash_algorithms, preferred)?;
        let digest = password_digest(
            algorithm,
            challenge.password_hash,
            credentials.password(),
            &challenge.salt,
        );

        let byte_order = if cfg!(target_endian = "big") {
            endian::BIG
        } else {
            endian::LITTLE
        };

        let text = format!(
            "{}:{}:{{{}}}{}:{}:{}:",
            byte_order, credentials.username, algorithm, digest, language, database
        );

        Ok(Self { algorithm, text })
    }

    /// Wire bytes of the response
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

/// Server verdict on a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// Logged in
    Ok,
    /// Go elsewhere (or restart) and log in again
    Redirect(RedirectTarget),
    /// Login rejected with the server's message
    Failed(String),
}

impl AuthReply {
    /// Parse the reply to a login response
    ///
    /// `#` lines are informational. When several redirects are offered the
    /// first one is taken.
    pub fn parse(text: &str) -> Result<Self> {
        let mut buf = ReadBuffer::from_slice(text.as_bytes());
        let mut errors = Vec::new();

        while let Some(l) = buf.read_line()? {
            match l.as_bytes().first() {
                None => continue,
                Some(&line::INFO) => {
                    tracing::debug!(info = &l[1..], "server info during login");
                }
                Some(&line::ERROR) => errors.push(l[1..].to_string()),
                Some(&line::REDIRECT) if errors.is_empty() => {
                    return Ok(AuthReply::Redirect(RedirectTarget::parse(l)?));
                }
                Some(&line::REDIRECT) => {}
                Some(_) if l == "=OK" => {}
                Some(_) => {
                    return Err(Error::decode(format!("unexpected login reply: {}", l)));
                }
            }
        }

        if errors.is_empty() {
            Ok(AuthReply::Ok)
        } else {
            Ok(AuthReply::Failed(errors.join("\n")))
        }
    }
}

/// Map a rejected login to the error the caller sees
pub fn classify_failure(message: &str, database: &str) -> Error {
    let lower = message.to_ascii_lowercase();

    if lower.contains("no such database") {
        Error::NoSuchDatabase {
            database: database.to_string(),
            message: message.to_string(),
        }
    } else if lower.contains("invalid credentials") || message.contains("InvalidCredentialsException")
    {
        Error::InvalidCredentials(message.to_string())
    } else {
        Error::AuthenticationFailed(message.to_string())
    }
}
