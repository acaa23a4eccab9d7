//! Pure name/description/CIDR/host validators (I1, I2).
//!
//! No `regex` dependency is pulled in — matching the teacher's
//! `is_valid_name` style, these are hand-written character scans over a
//! small, fixed grammar.

use crate::algebra::Prefix;
use crate::error::{CoreError, Result};
use std::net::Ipv4Addr;

const NAME_MAX_LEN: usize = 64;
const DESC_MAX_LEN: usize = 128;

fn is_boundary_char(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// I1: `^(?![._-])[A-Za-z0-9._-]{1,64}(?<![._-])$`
pub fn name_ok(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() || chars.len() > NAME_MAX_LEN {
        return false;
    }
    if is_boundary_char(chars[0]) || is_boundary_char(*chars.last().unwrap()) {
        return false;
    }
    chars
        .iter()
        .all(|&c| c.is_ascii_alphanumeric() || is_boundary_char(c))
}

/// I1: descriptions allow letters, digits, spaces, and slashes up to 128 chars.
pub fn desc_ok(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > DESC_MAX_LEN {
        return false;
    }
    chars
        .iter()
        .all(|&c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-' | '/'))
}

/// Validate a name, producing a `CoreError` on failure.
pub fn validate_name(s: &str) -> Result<()> {
    if name_ok(s) {
        Ok(())
    } else {
        Err(CoreError::invalid_name(s))
    }
}

/// Validate a description, producing a `CoreError` on failure.
pub fn validate_desc(s: &str) -> Result<()> {
    if desc_ok(s) {
        Ok(())
    } else {
        Err(CoreError::invalid_description(s))
    }
}

/// I2: the CIDR string must already be in canonical form — parsing it and
/// re-rendering it must produce the identical string. Returns the parsed
/// prefix, or `NonCanonicalCidr{canonical}` naming the form the caller
/// should have used.
pub fn cidr_canonical(s: &str) -> Result<Prefix> {
    let parsed = Prefix::parse(s)?;
    if parsed.to_string() != s {
        return Err(CoreError::non_canonical_cidr(parsed.to_string()));
    }
    Ok(parsed)
}

/// Parse a single IPv4 host address.
pub fn host_ok(s: &str) -> Result<Ipv4Addr> {
    s.parse().map_err(|_| CoreError::invalid_address(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_reject_boundary_chars() {
        assert!(name_ok("blk1"));
        assert!(name_ok("a.b_c-d"));
        assert!(!name_ok(".leading"));
        assert!(!name_ok("trailing."));
        assert!(!name_ok("trailing-"));
        assert!(!name_ok(""));
        assert!(!name_ok(&"a".repeat(65)));
    }

    #[test]
    fn names_reject_bad_chars() {
        assert!(!name_ok("has space"));
        assert!(!name_ok("has/slash"));
    }

    #[test]
    fn descriptions_allow_spaces_and_slashes() {
        assert!(desc_ok("main corp space / prod"));
        assert!(desc_ok(""));
        assert!(!desc_ok(&"x".repeat(129)));
        assert!(!desc_ok("bad\tchar"));
    }

    #[test]
    fn cidr_canonical_accepts_canonical_and_rejects_host_bits() {
        assert!(cidr_canonical("10.0.0.0/24").is_ok());
        let err = cidr_canonical("10.0.0.5/24").unwrap_err();
        match err {
            CoreError::NonCanonicalCidr { canonical } => assert_eq!(canonical, "10.0.0.0/24"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn host_ok_parses_ipv4() {
        assert!(host_ok("10.0.0.5").is_ok());
        assert!(host_ok("not-an-ip").is_err());
    }
}
