//! EPC identifiers and target selection.
//!
//! Readers report EPCs in whatever shape their SDK prints them: lower-case,
//! grouped in words (`"002C 0000 1234"`), or packed. Every comparison in the
//! crate goes through [`Epc`], whose canonical form is upper-case hex with no
//! separators.

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical EPC: upper-case hexadecimal digits, no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Epc(String);

impl Epc {
    /// Canonicalize and validate an EPC string.
    ///
    /// Whitespace anywhere in the input is dropped and letters are upper-cased.
    /// Empty input or any non-hex character is rejected.
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        let canonical = canonicalize(raw);
        if canonical.is_empty() || !canonical.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProbeError::InvalidEpc(raw.to_string()));
        }
        Ok(Self(canonical))
    }

    /// Canonical hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this EPC begins with `prefix`.
    pub fn starts_with(&self, prefix: &Epc) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Raw bytes of the EPC. An odd trailing nibble is ignored.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .as_bytes()
            .chunks_exact(2)
            .filter_map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
            })
            .collect()
    }
}

/// Strip whitespace and upper-case, without validating.
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl FromStr for Epc {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Epc {
    type Error = ProbeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Epc> for String {
    fn from(value: Epc) -> Self {
        value.0
    }
}

impl fmt::Display for Epc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which tags a session cares about. Set once when the session opens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetSpec {
    /// Match-all sentinel: every observation is accepted.
    #[default]
    Any,
    /// Only this EPC.
    Exact(Epc),
    /// Any EPC starting with this prefix (e.g. a chip manufacturer's TID range).
    Prefix(Epc),
}

impl TargetSpec {
    /// Parse an optional exact target. `None`, empty text, `*` and `any` mean match-all.
    pub fn exact(raw: Option<&str>) -> ProbeResult<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("*") => Ok(TargetSpec::Any),
            Some(s) if s.eq_ignore_ascii_case("any") => Ok(TargetSpec::Any),
            Some(s) => Ok(TargetSpec::Exact(Epc::parse(s)?)),
        }
    }

    /// Parse a prefix target.
    pub fn prefix(raw: &str) -> ProbeResult<Self> {
        Ok(TargetSpec::Prefix(Epc::parse(raw)?))
    }

    /// Whether `epc` satisfies this target.
    pub fn matches(&self, epc: &Epc) -> bool {
        match self {
            TargetSpec::Any => true,
            TargetSpec::Exact(target) => target == epc,
            TargetSpec::Prefix(prefix) => epc.starts_with(prefix),
        }
    }

    /// The exact EPC, if this target names one.
    pub fn exact_epc(&self) -> Option<&Epc> {
        match self {
            TargetSpec::Exact(epc) => Some(epc),
            _ => None,
        }
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Any => f.write_str("*"),
            TargetSpec::Exact(epc) => write!(f, "{epc}"),
            TargetSpec::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}
