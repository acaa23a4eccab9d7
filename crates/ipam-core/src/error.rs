// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for the pure IPAM domain (prefix algebra, validation, model, utilization).
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A CIDR string could not be parsed at all.
    #[error("Invalid CIDR format: '{value}'")]
    #[diagnostic(
        code(ipam::invalid_cidr_format),
        help("Use a canonical IPv4 CIDR like '10.0.0.0/16'")
    )]
    InvalidCidrFormat { value: String },

    /// A CIDR string parsed but was not in canonical form.
    #[error("Invalid CIDR value, try '{canonical}' instead.")]
    #[diagnostic(code(ipam::non_canonical_cidr))]
    NonCanonicalCidr { canonical: String },

    /// A host address could not be parsed.
    #[error("Invalid IPv4 address: '{value}'")]
    #[diagnostic(code(ipam::invalid_address))]
    InvalidAddress { value: String },

    /// A name failed the I1 grammar.
    #[error("Invalid name: '{value}'")]
    #[diagnostic(
        code(ipam::invalid_name),
        help("Names are 1-64 chars of letters, digits, '.', '_', '-', and may not start or end with '.', '_', or '-'")
    )]
    InvalidName { value: String },

    /// A description failed the I1 grammar.
    #[error("Invalid description: '{value}'")]
    #[diagnostic(code(ipam::invalid_description))]
    InvalidDescription { value: String },

    /// Requested a subnet/host operation with an out-of-range prefix length.
    #[error("Prefix length {len} is out of range for this operation")]
    #[diagnostic(code(ipam::invalid_prefix_len))]
    InvalidPrefixLen { len: u8 },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_cidr_format(value: impl Into<String>) -> Self {
        Self::InvalidCidrFormat { value: value.into() }
    }

    pub fn non_canonical_cidr(canonical: impl Into<String>) -> Self {
        Self::NonCanonicalCidr { canonical: canonical.into() }
    }

    pub fn invalid_address(value: impl Into<String>) -> Self {
        Self::InvalidAddress { value: value.into() }
    }

    pub fn invalid_name(value: impl Into<String>) -> Self {
        Self::InvalidName { value: value.into() }
    }

    pub fn invalid_description(value: impl Into<String>) -> Self {
        Self::InvalidDescription { value: value.into() }
    }

    pub fn invalid_prefix_len(len: u8) -> Self {
        Self::InvalidPrefixLen { len }
    }
}
