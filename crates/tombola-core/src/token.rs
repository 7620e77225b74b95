//! Correlation tokens for inbound platform events
//!
//! Announcements and claim prompts carry an opaque token so that button
//! presses arriving later can be matched to the cycle that produced them.
//! The format is `GIVEAWAY-<id>` or `CLAIM-<id>` where `<id>` is the cycle
//! id rendered in radix 36. Parsing is case-insensitive; anything that does
//! not parse is simply not one of our tokens.

use crate::identifiers::CycleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix carried by entry buttons on announcements
const ENTRY_PREFIX: &str = "GIVEAWAY-";
/// Prefix carried by claim buttons on winner prompts
const CLAIM_PREFIX: &str = "CLAIM-";

/// Failure to interpret a string as one of our correlation tokens
///
/// Callers treat this as "not for us" and ignore the event rather than
/// surfacing an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The string does not start with a known prefix
    #[error("unknown token prefix: {0}")]
    UnknownPrefix(String),

    /// The id portion is not valid radix-36
    #[error("invalid cycle id in token: {0}")]
    InvalidId(String),
}

/// Which kind of interaction the token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Registration of interest on an announcement
    Entry,
    /// Winner confirmation on a claim prompt
    Claim,
}

/// A decoded correlation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// The interaction kind encoded in the prefix
    pub kind: TokenKind,
    /// The cycle the interaction belongs to
    pub cycle: CycleId,
}

impl CorrelationToken {
    /// Token placed on announcement entry buttons
    pub fn entry(cycle: CycleId) -> Self {
        Self {
            kind: TokenKind::Entry,
            cycle,
        }
    }

    /// Token placed on winner claim buttons
    pub fn claim(cycle: CycleId) -> Self {
        Self {
            kind: TokenKind::Claim,
            cycle,
        }
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            TokenKind::Entry => ENTRY_PREFIX,
            TokenKind::Claim => CLAIM_PREFIX,
        };
        write!(f, "{}{}", prefix, encode_radix36(self.cycle.0))
    }
}

impl FromStr for CorrelationToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let (kind, rest) = if let Some(rest) = upper.strip_prefix(ENTRY_PREFIX) {
            (TokenKind::Entry, rest)
        } else if let Some(rest) = upper.strip_prefix(CLAIM_PREFIX) {
            (TokenKind::Claim, rest)
        } else {
            return Err(TokenError::UnknownPrefix(s.to_string()));
        };

        let id = decode_radix36(rest).ok_or_else(|| TokenError::InvalidId(s.to_string()))?;
        Ok(CorrelationToken {
            kind,
            cycle: CycleId(id),
        })
    }
}

const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn encode_radix36(mut value: i64) -> String {
    if value <= 0 {
        // Row ids start at 1; 0 only shows up in hand-built tokens.
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("radix-36 digits are ASCII")
}

fn decode_radix36(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for c in s.chars() {
        let digit = c.to_digit(36)? as i64;
        value = value.checked_mul(36)?.checked_add(digit)?;
    }
    Some(value)
}
