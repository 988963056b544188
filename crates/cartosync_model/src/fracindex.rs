//! Fractional index sequencer.
//!
//! Order keys are non-empty strings over the alphabet `0-9A-Za-z`,
//! compared lexicographically. [`key_between`] returns a key strictly
//! between its two boundaries (either of which may be open), growing
//! the key length only as insertion density requires. Reordering an
//! entity is an ordinary field update carrying the new key; the server
//! applies no special-case logic to order keys.
//!
//! Generated keys never end in the smallest digit (`'0'`), so a key
//! can always be generated before one of ours. Externally supplied
//! keys such as `"a0"` are accepted as-is; the one gap that is
//! genuinely empty (an upper bound extending the lower with nothing
//! but `'0'`s) reports [`FracIndexError::NoRoom`]. Pathological
//! dense-insert sequences grow long keys; rebalancing them is a bulk
//! rewrite via [`evenly_spaced`], off the hot path.

use thiserror::Error;

/// Digits in ascending order.
const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: usize = DIGITS.len();

/// Errors produced by the sequencer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FracIndexError {
    /// A boundary key was empty or used a character outside the
    /// alphabet.
    #[error("invalid order key {0:?}")]
    InvalidKey(String),

    /// The lower boundary did not sort before the upper boundary.
    #[error("order keys out of order: {a:?} >= {b:?}")]
    Unordered {
        /// Lower boundary.
        a: String,
        /// Upper boundary.
        b: String,
    },

    /// No key sorts strictly between the boundaries: the upper bound
    /// extends the lower with nothing but the smallest digit.
    #[error("no key fits between {a:?} and {b:?}")]
    NoRoom {
        /// Lower boundary.
        a: String,
        /// Upper boundary.
        b: String,
    },

    /// [`evenly_spaced`] was asked for more keys than fit in two
    /// digits.
    #[error("cannot evenly space {0} keys")]
    TooMany(usize),
}

/// Generates a key strictly between `a` and `b`.
///
/// `None` is an open boundary: `key_between(None, None)` seeds an
/// empty sequence, `key_between(Some(last), None)` appends, and
/// `key_between(None, Some(first))` prepends.
pub fn key_between(a: Option<&str>, b: Option<&str>) -> Result<String, FracIndexError> {
    if let Some(a) = a {
        validate_key(a)?;
    }
    if let Some(b) = b {
        validate_key(b)?;
    }
    if let (Some(a), Some(b)) = (a, b) {
        if a >= b {
            return Err(FracIndexError::Unordered {
                a: a.to_string(),
                b: b.to_string(),
            });
        }
    }
    let lower = a.unwrap_or("");
    if let Some(b) = b {
        // The gap is empty when `b` is `a` plus trailing zeros; no
        // string sorts strictly between "a" and "a0".
        if b.starts_with(lower) && b.as_bytes()[lower.len()..].iter().all(|&c| c == b'0') {
            return Err(FracIndexError::NoRoom {
                a: lower.to_string(),
                b: b.to_string(),
            });
        }
    }
    Ok(midpoint(lower, b))
}

/// Checks that `key` is a well-formed order key: non-empty, alphabet
/// characters only. Trailing zeros are legal in stored keys even
/// though the sequencer never generates them.
pub fn validate_key(key: &str) -> Result<(), FracIndexError> {
    let bytes = key.as_bytes();
    if !bytes.is_empty() && bytes.iter().all(|c| DIGITS.contains(c)) {
        Ok(())
    } else {
        Err(FracIndexError::InvalidKey(key.to_string()))
    }
}

/// Generates `n` evenly spread keys for a bulk insert.
///
/// The keys are strictly increasing and leave room on both sides and
/// between every pair. Supports up to one less than `62 * 62` keys.
pub fn evenly_spaced(n: usize) -> Result<Vec<String>, FracIndexError> {
    if n >= BASE * BASE {
        return Err(FracIndexError::TooMany(n));
    }
    let mut keys = Vec::with_capacity(n);
    for i in 0..n {
        let idx = (i + 1) * BASE * BASE / (n + 1);
        let (hi, lo) = (idx / BASE, idx % BASE);
        let mut key = String::new();
        key.push(char::from(DIGITS[hi]));
        if lo != 0 {
            key.push(char::from(DIGITS[lo]));
        }
        keys.push(key);
    }
    Ok(keys)
}

/// Returns the string midpoint of two ordered keys. The caller has
/// already ruled out the empty gap, so a midpoint always exists.
///
/// `a` is implicitly right-padded with the smallest digit when it is
/// shorter than `b`, which keeps outputs free of trailing zeros.
fn midpoint(a: &str, b: Option<&str>) -> String {
    if let Some(b) = b {
        let a_bytes = a.as_bytes();
        let b_bytes = b.as_bytes();
        let mut n = 0;
        while n < b_bytes.len() && a_bytes.get(n).copied().unwrap_or(b'0') == b_bytes[n] {
            n += 1;
        }
        if n > 0 {
            let a_rest = if n < a_bytes.len() { &a[n..] } else { "" };
            return format!("{}{}", &b[..n], midpoint(a_rest, Some(&b[n..])));
        }
    }

    let digit_a = a.bytes().next().map_or(0, digit_index);
    let digit_b = b
        .and_then(|s| s.bytes().next())
        .map_or(BASE, digit_index);

    if digit_b - digit_a > 1 {
        let mid = (digit_a + digit_b + 1) / 2;
        char::from(DIGITS[mid]).to_string()
    } else if b.map_or(false, |s| s.len() > 1) {
        // Consecutive first digits and `b` has depth to spare: its
        // first digit alone sorts strictly between.
        b.unwrap_or("")[..1].to_string()
    } else {
        // Keep `a`'s first digit and recurse into its tail.
        let rest = if a.is_empty() { "" } else { &a[1..] };
        format!("{}{}", char::from(DIGITS[digit_a]), midpoint(rest, None))
    }
}

fn digit_index(c: u8) -> usize {
    DIGITS.iter().position(|&d| d == c).unwrap_or(0)
}
