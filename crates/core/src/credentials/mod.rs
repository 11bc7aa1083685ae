//! Credential negotiation against remote transports.
//!
//! The transport raises one challenge per authentication round; the
//! [`negotiator`] answers each with the next untried mechanism and refuses
//! once every mechanism the server accepts has been offered.

pub mod negotiator;
pub mod ssh_config;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

pub use negotiator::{Credential, CredentialAttempt, CredentialRequest, CredentialSource};

/// Bit set of credential mechanisms.
///
/// Used both for what a server accepts on a challenge and for what has been
/// offered during the current connection attempt.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AuthMechanisms(u8);

impl AuthMechanisms {
    pub const NONE: Self = Self(0);
    /// Bare username (SSH user discovery round).
    pub const USERNAME: Self = Self(1 << 0);
    /// Username + password over HTTP(S).
    pub const USER_PASS_PLAINTEXT: Self = Self(1 << 1);
    /// Key-based SSH; covers agent and key files on the server side.
    pub const SSH_KEY: Self = Self(1 << 2);
    /// SSH agent (tracking only).
    pub const SSH_AGENT: Self = Self(1 << 3);
    /// Transport default credentials (tracking only).
    pub const DEFAULT: Self = Self(1 << 4);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for AuthMechanisms {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AuthMechanisms {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AuthMechanisms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::USERNAME, "USERNAME"),
            (Self::USER_PASS_PLAINTEXT, "USER_PASS_PLAINTEXT"),
            (Self::SSH_KEY, "SSH_KEY"),
            (Self::SSH_AGENT, "SSH_AGENT"),
            (Self::DEFAULT, "DEFAULT"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("AuthMechanisms(NONE)")
        } else {
            write!(f, "AuthMechanisms({})", set.join(" | "))
        }
    }
}
