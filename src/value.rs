//! Best-effort typed view over a raw string input.
//!
//! Query parameters, path parameters and cookies all arrive as strings. A
//! [`Value`] wraps one such string and converts it on demand. Two method
//! families exist:
//!
//! - `parse_*` — strict: `Option<T>`, `None` on malformed input.
//! - `to_*` — lenient: always succeed, folding `None` into the zero value
//!   of the target type.
//!
//! The lenient family is what the request accessors hand out: a missing
//! parameter, a malformed one and a legitimately-zero one all read the same
//! at the call site. That trade is deliberate. Call sites that need the
//! distinction use the strict family.
//!
//! ```rust
//! use kiroku::Value;
//!
//! assert_eq!(Value::from("12345").to_i64(), 12345);
//! assert_eq!(Value::from("not a number").to_i64(), 0);
//! assert_eq!(Value::from("not a number").parse_i64(), None);
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

/// A raw string input with on-demand typed conversions.
///
/// The wrapped string is never mutated; every conversion is a pure read.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Value(String);

impl Value {
    /// The wrapped string, untouched.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper, returning the string.
    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // ── Strict conversions ────────────────────────────────────────────────────

    /// Base-10 machine-width signed integer.
    pub fn parse_isize(&self) -> Option<isize> {
        self.0.parse().ok()
    }

    /// Base-10 signed 64-bit integer.
    pub fn parse_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Base-10 unsigned 64-bit integer.
    pub fn parse_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Accepted literals: `1`, `t`, `T`, `TRUE`, `true`, `True` and their
    /// false counterparts. Anything else is `None`.
    pub fn parse_bool(&self) -> Option<bool> {
        match self.0.as_str() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        }
    }

    /// A 6-octet hardware address, colon- or hyphen-separated, canonicalized
    /// to lowercase hyphenated form (`xx-xx-xx-xx-xx-xx`).
    ///
    /// The all-zero address is `None`: it is what uninitialized firmware
    /// reports, and no caller wants to store it.
    pub fn parse_mac(&self) -> Option<String> {
        let sep = if self.0.contains(':') { ':' } else { '-' };
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in self.0.split(sep) {
            if count == 6 || part.len() != 2 {
                return None;
            }
            octets[count] = u8::from_str_radix(part, 16).ok()?;
            count += 1;
        }
        if count != 6 || octets.iter().all(|b| *b == 0) {
            return None;
        }
        Some(
            octets
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join("-"),
        )
    }

    /// A point in time, tried in strict order:
    ///
    /// 1. RFC 3339, with or without fractional seconds;
    /// 2. a bare `YYYY-MM-DD` calendar date, at midnight UTC;
    /// 3. a base-10 integer taken as Unix epoch seconds, only if non-zero.
    ///
    /// The order is load-bearing: a string that parses as a date must never
    /// reach the integer branch.
    pub fn parse_datetime(&self) -> Option<DateTime<Utc>> {
        if let Ok(t) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(t.with_timezone(&Utc));
        }
        if let Ok(d) = NaiveDate::parse_from_str(&self.0, "%Y-%m-%d") {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
        match self.0.parse::<i64>() {
            Ok(secs) if secs != 0 => DateTime::from_timestamp(secs, 0),
            _ => None,
        }
    }

    // ── Lenient conversions ───────────────────────────────────────────────────

    /// Machine-width signed integer; 0 on malformed input.
    pub fn to_isize(&self) -> isize {
        self.parse_isize().unwrap_or(0)
    }

    /// Signed 64-bit integer; 0 on malformed input.
    pub fn to_i64(&self) -> i64 {
        self.parse_i64().unwrap_or(0)
    }

    /// Unsigned 64-bit integer; 0 on malformed input.
    pub fn to_u64(&self) -> u64 {
        self.parse_u64().unwrap_or(0)
    }

    /// Boolean; `false` on malformed input.
    pub fn to_bool(&self) -> bool {
        self.parse_bool().unwrap_or(false)
    }

    /// Canonical hardware address; empty string on malformed input or the
    /// all-zero address.
    pub fn to_mac(&self) -> String {
        self.parse_mac().unwrap_or_default()
    }

    /// Timestamp; the Unix epoch on malformed input.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.parse_datetime().unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for Value {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
