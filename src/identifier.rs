//! Rendering and parsing of sequential identifiers such as `IRO-2025-000042`.
//!
//! An identifier is a namespace prefix followed by a number, left padded with zeros to the
//! namespace's fixed `width`. Because every suffix in a namespace has the same width, the
//! lexicographically greatest identifier is also the numerically greatest one, which is what
//! [`resolve_next`] relies on. Changing the width of a namespace that already has issued
//! identifiers breaks that ordering.
//!
//! [`resolve_next`]: ../allocator/fn.resolve_next.html
use std::fmt;

use serde::{Deserialize, Serialize};

/// default number of digits in the numeric suffix
pub const DEFAULT_WIDTH: usize = 6;

/// A logical partition that identifiers are sequentially numbered within,
/// for example "books for year 2025".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceNamespace {
    prefix: String,
    width: usize,
}

impl SequenceNamespace {
    /// creates a namespace with the given `prefix` and the default suffix width of 6
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_width(prefix, DEFAULT_WIDTH)
    }

    /// creates a namespace with the given `prefix` and a suffix zero padded to `width` digits
    pub fn with_width(prefix: impl Into<String>, width: usize) -> Self {
        SequenceNamespace {
            prefix: prefix.into(),
            width,
        }
    }

    /// builds the yearly namespace `{tag}-{year}-` used for books
    pub fn yearly(tag: &str, year: i32, width: usize) -> Self {
        Self::with_width(format!("{}-{}-", tag, year), width)
    }

    /// the namespace key every identifier in this namespace starts with
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// the fixed digit width of the numeric suffix
    pub fn width(&self) -> usize {
        self.width
    }
}

impl fmt::Display for SequenceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, "N".repeat(self.width))
    }
}

/// renders `number` within `namespace`.
///
/// A number with more digits than the namespace width is written out in full. It is never
/// truncated, so `("IRO-2025-", 1000000)` with width 6 becomes `IRO-2025-1000000`.
///
/// # Examples
/// ```rust
/// use shelf::{format_identifier, SequenceNamespace};
///
/// let ns = SequenceNamespace::new("IRO-2025-");
/// assert_eq!(format_identifier(&ns, 7), "IRO-2025-000007");
/// ```
pub fn format_identifier(namespace: &SequenceNamespace, number: u64) -> String {
    format!(
        "{}{:0width$}",
        namespace.prefix,
        number,
        width = namespace.width
    )
}

/// extracts the numeric suffix of `identifier`.
///
/// Returns `None` if `identifier` does not start with the namespace prefix, or if the rest of
/// it is empty or contains anything other than ASCII digits.
pub fn parse_suffix(namespace: &SequenceNamespace, identifier: &str) -> Option<u64> {
    let digits = identifier.strip_prefix(namespace.prefix())?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
