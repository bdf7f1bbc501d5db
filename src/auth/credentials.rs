use std::collections::HashMap;

use subtle::ConstantTimeEq;

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Stored secret for a user, classified once at configuration load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPassword {
    Plaintext(String),
    Bcrypt(String),
}

impl StoredPassword {
    /// Tags a raw configured password as a bcrypt hash or plaintext.
    #[must_use]
    pub fn classify(raw: String) -> Self {
        if BCRYPT_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            Self::Bcrypt(raw)
        } else {
            Self::Plaintext(raw)
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: StoredPassword,
}

/// Verifies username/password pairs against the configured user list.
///
/// Unknown usernames burn a dummy bcrypt verification so the response latency
/// does not reveal whether the account exists.
#[derive(Debug)]
pub struct CredentialVerifier {
    users: HashMap<String, StoredPassword>,
    dummy_hash: String,
}

impl CredentialVerifier {
    /// # Errors
    /// Fails only if the dummy hash cannot be computed.
    pub fn new(users: &[User]) -> Result<Self, bcrypt::BcryptError> {
        let dummy_hash = bcrypt::hash("doorward.dummy", bcrypt::DEFAULT_COST)?;
        let users = users
            .iter()
            .map(|u| (u.username.clone(), u.password.clone()))
            .collect();
        Ok(Self { users, dummy_hash })
    }

    /// Returns the canonical username on success, `None` on any mismatch.
    /// Never distinguishes unknown-user from wrong-password.
    #[must_use]
    pub fn verify(&self, username: &str, password: &str) -> Option<String> {
        match self.users.get(username) {
            Some(StoredPassword::Bcrypt(hash)) => {
                if bcrypt::verify(password, hash).unwrap_or(false) {
                    Some(username.to_owned())
                } else {
                    None
                }
            }
            Some(StoredPassword::Plaintext(stored)) => {
                if bool::from(password.as_bytes().ct_eq(stored.as_bytes())) {
                    Some(username.to_owned())
                } else {
                    None
                }
            }
            None => {
                let _ = bcrypt::verify(password, &self.dummy_hash);
                None
            }
        }
    }
}
