//! Session Tokens
//!
//! Tokens are random (version 4) UUIDs in canonical lowercase hyphenated
//! form, e.g. `1b4e28ba-2fa1-41d2-883f-0016d3cca427`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

use super::error::{SessionError, SessionResult};

/// Length of every token
pub const TOKEN_LENGTH: usize = 36;

const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];
const VERSION_POSITION: usize = 14;
const VARIANT_POSITION: usize = 19;

/// Opaque identifier of a persistent session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Mint a fresh token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Accept a caller-supplied token if it is well formed
    pub fn parse(s: &str) -> SessionResult<Self> {
        if is_valid_token(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(SessionError::MalformedToken(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Strict format check; never consults the registry
pub fn is_valid_token(s: &str) -> bool {
    if s.len() != TOKEN_LENGTH {
        return false;
    }

    s.bytes().enumerate().all(|(i, b)| {
        if HYPHEN_POSITIONS.contains(&i) {
            b == b'-'
        } else if i == VERSION_POSITION {
            b == b'4'
        } else if i == VARIANT_POSITION {
            matches!(b, b'8' | b'9' | b'a' | b'b')
        } else {
            matches!(b, b'0'..=b'9' | b'a'..=b'f')
        }
    })
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}
