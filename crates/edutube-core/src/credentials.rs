//! Credential pool with quota-driven rotation.
//!
//! The pool owns the ordered key list and the active index. A quota failure
//! opens an *exhaustion episode* anchored at the key that was active when it
//! happened; rotating back to that anchor before any call succeeds means every
//! key has been tried, and the pool reports [`AppError::PoolExhausted`].
//! A successful call closes the episode.
//!
//! Clients built from a credential must be rebuilt after every rotation;
//! [`CredentialPool::generation`] changes on each rotation so callers can
//! detect stale handles.

use std::fmt;

use crate::error::AppError;

/// An opaque API credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    index: usize,
    secret: String,
}

impl Credential {
    /// Position of this credential in the configured list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Short, log-safe form: position plus the last four characters.
    pub fn redacted(&self) -> String {
        let tail: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("#{} (…{})", self.index, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Ordered, non-empty set of credentials with a single active index.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    active: usize,
    episode_start: Option<usize>,
    generation: u64,
}

impl CredentialPool {
    /// Builds a pool from the configured keys. The first key is active.
    pub fn new(keys: Vec<String>) -> Result<Self, AppError> {
        if keys.is_empty() {
            return Err(AppError::ConfigError(
                "credential pool needs at least one key".to_string(),
            ));
        }

        let credentials = keys
            .into_iter()
            .enumerate()
            .map(|(index, secret)| Credential { index, secret })
            .collect();

        Ok(Self {
            credentials,
            active: 0,
            episode_start: None,
            generation: 0,
        })
    }

    /// A single empty credential, for collaborators that need no key.
    pub fn anonymous() -> Self {
        Self {
            credentials: vec![Credential {
                index: 0,
                secret: String::new(),
            }],
            active: 0,
            episode_start: None,
            generation: 0,
        }
    }

    /// The credential currently in use.
    pub fn active(&self) -> &Credential {
        &self.credentials[self.active]
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Incremented on every successful rotation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advances to the next credential after a quota failure on the active one.
    ///
    /// Returns the new active credential, or `PoolExhausted` if the rotation
    /// would return to the credential that opened the current episode. On
    /// exhaustion the active index is left unchanged.
    pub fn rotate(&mut self) -> Result<&Credential, AppError> {
        let start = *self.episode_start.get_or_insert(self.active);
        let next = (self.active + 1) % self.credentials.len();

        if next == start {
            tracing::error!(
                credentials = self.credentials.len(),
                "Every credential reported quota exhaustion"
            );
            return Err(AppError::PoolExhausted {
                credentials: self.credentials.len(),
            });
        }

        self.active = next;
        self.generation += 1;
        tracing::warn!(
            credential = %self.credentials[next].redacted(),
            "Rotated to next credential"
        );
        Ok(&self.credentials[next])
    }

    /// Closes any open exhaustion episode.
    pub fn record_success(&mut self) {
        self.episode_start = None;
    }
}
