//! Capability values guarding registration and policy mutation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ownership capability for one registration.
///
/// A random non-negative 31-bit value handed out once by `register`. The
/// value `0` is the back-compat weak mode: a registration holding it accepts
/// any presented token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VerifyToken(u32);

/// A raw token value above [`VerifyToken::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("token value {0:#x} is outside the 31-bit token range")]
pub struct TokenOutOfRange(pub u32);

impl VerifyToken {
    /// Weak-mode token: no verification required.
    pub const UNVERIFIED: VerifyToken = VerifyToken(0);

    /// Largest representable token value (31 bits).
    pub const MAX: u32 = 0x7fff_ffff;

    /// Draw a fresh non-zero token.
    pub fn generate() -> Self {
        loop {
            let raw = (Uuid::new_v4().as_u128() as u32) & Self::MAX;
            if raw != 0 {
                return VerifyToken(raw);
            }
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_unverified(self) -> bool {
        self.0 == 0
    }

    /// Whether `presented` unlocks a registration holding `self`.
    pub fn admits(self, presented: VerifyToken) -> bool {
        self.is_unverified() || self.0 == presented.0
    }
}

impl TryFrom<u32> for VerifyToken {
    type Error = TokenOutOfRange;

    /// Wrap a caller-held raw value. Values above [`VerifyToken::MAX`] are
    /// rejected, never truncated.
    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        if raw > Self::MAX {
            return Err(TokenOutOfRange(raw));
        }
        Ok(VerifyToken(raw))
    }
}

impl From<VerifyToken> for u32 {
    fn from(token: VerifyToken) -> u32 {
        token.0
    }
}

impl std::fmt::Debug for VerifyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unverified() {
            write!(f, "VerifyToken(unverified)")
        } else {
            write!(f, "VerifyToken(..)")
        }
    }
}

/// Process-level key gating permission-policy changes.
///
/// Distinct from registration tokens: it identifies the internal subsystem
/// allowed to grant or revoke policy, not the owner of a registration.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKey(Uuid);

impl AccessKey {
    pub fn generate() -> Self {
        AccessKey(Uuid::new_v4())
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKey(..)")
    }
}
