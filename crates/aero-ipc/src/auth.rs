//! Authentication Message
//!
//! Fixed 44-byte record exchanged on the authentication channel:
//!
//! ```text
//! kind u32 | user_id u32 | timestamp u32 | security_token [u8; 32]
//! ```

use crate::wire::{read_u32, require_exact, WireError};
use crate::SECURITY_TOKEN_LEN;

/// Encoded size of an Authentication Message.
pub const AUTH_MESSAGE_SIZE: usize = 12 + SECURITY_TOKEN_LEN;

/// Authentication Message kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AuthKind {
    /// Gate asks the service to verify the user
    VerifyRequest = 1,
    /// Verification succeeded
    Success = 2,
    /// Verification failed
    Failure = 3,
}

impl AuthKind {
    /// Convert from the wire enumerant
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(AuthKind::VerifyRequest),
            2 => Some(AuthKind::Success),
            3 => Some(AuthKind::Failure),
            _ => None,
        }
    }
}

/// Authentication Message
///
/// The token is private so every constructor zero-fills it; no message
/// ever carries uninitialized token bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthMessage {
    /// Message kind
    pub kind: AuthKind,
    /// Target user
    pub user_id: u32,
    /// Tick count when the message was produced
    pub timestamp: u32,
    token: [u8; SECURITY_TOKEN_LEN],
}

impl AuthMessage {
    /// Build a message with an all-zero token.
    pub fn new(kind: AuthKind, user_id: u32, timestamp: u32) -> Self {
        Self {
            kind,
            user_id,
            timestamp,
            token: [0; SECURITY_TOKEN_LEN],
        }
    }

    /// Verify-Request from the gate to the service.
    pub fn verify_request(user_id: u32, timestamp: u32) -> Self {
        Self::new(AuthKind::VerifyRequest, user_id, timestamp)
    }

    /// Success verdict carrying a session token.
    ///
    /// Tokens shorter than 32 bytes are zero-padded; longer ones are cut.
    pub fn success(user_id: u32, timestamp: u32, token: &[u8]) -> Self {
        Self::new(AuthKind::Success, user_id, timestamp).with_token(token)
    }

    /// Failure verdict.
    pub fn failure(user_id: u32, timestamp: u32) -> Self {
        Self::new(AuthKind::Failure, user_id, timestamp)
    }

    /// Replace the token, zero-filling whatever `token` does not cover.
    pub fn with_token(mut self, token: &[u8]) -> Self {
        self.token = [0; SECURITY_TOKEN_LEN];
        let n = token.len().min(SECURITY_TOKEN_LEN);
        self.token[..n].copy_from_slice(&token[..n]);
        self
    }

    /// Security token bytes
    pub fn token(&self) -> &[u8; SECURITY_TOKEN_LEN] {
        &self.token
    }

    /// Encode to the 44-byte wire record
    pub fn encode(&self) -> [u8; AUTH_MESSAGE_SIZE] {
        let mut out = [0u8; AUTH_MESSAGE_SIZE];
        out[0..4].copy_from_slice(&(self.kind as u32).to_le_bytes());
        out[4..8].copy_from_slice(&self.user_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.timestamp.to_le_bytes());
        out[12..].copy_from_slice(&self.token);
        out
    }

    /// Decode from the 44-byte wire record
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        require_exact(data, AUTH_MESSAGE_SIZE)?;

        let raw_kind = read_u32(data, 0);
        let kind = AuthKind::from_u32(raw_kind).ok_or(WireError::UnknownAuthKind(raw_kind))?;

        let mut token = [0u8; SECURITY_TOKEN_LEN];
        token.copy_from_slice(&data[12..AUTH_MESSAGE_SIZE]);

        Ok(Self {
            kind,
            user_id: read_u32(data, 4),
            timestamp: read_u32(data, 8),
            token,
        })
    }
}
