//! Numeric replies the relay reacts to.
//!
//! Every other numeric is relayed as an opaque command string.

use std::str::FromStr;

/// A known IRC numeric reply.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Response {
    /// `001` - registration accepted.
    RPL_WELCOME = 1,
    /// `433` - the requested nickname is taken.
    ERR_NICKNAMEINUSE = 433,
}

impl Response {
    /// The numeric code.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a known numeric by code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::RPL_WELCOME),
            433 => Some(Self::ERR_NICKNAMEINUSE),
            _ => None,
        }
    }
}

impl FromStr for Response {
    type Err = ();

    /// Numerics travel as exactly three ASCII digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        s.parse::<u16>()
            .ok()
            .and_then(Self::from_code)
            .ok_or(())
    }
}
