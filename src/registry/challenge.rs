//! `WWW-Authenticate` challenge parsing
//!
//! Handles headers of the form `<Scheme> k1="v1", k2="v2"` for the two schemes
//! registries use in practice, `Basic` and `Bearer`.

use crate::error::{RegistryError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Basic => f.write_str("Basic"),
            AuthScheme::Bearer => f.write_str("Bearer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: AuthScheme,
    pub params: BTreeMap<String, String>,
}

impl AuthChallenge {
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').ok_or_else(|| {
            RegistryError::Challenge(format!("malformed challenge {:?}: expected \"<scheme> <params>\"", header))
        })?;

        let scheme = if scheme.eq_ignore_ascii_case("basic") {
            AuthScheme::Basic
        } else if scheme.eq_ignore_ascii_case("bearer") {
            AuthScheme::Bearer
        } else {
            return Err(RegistryError::Challenge(format!("unsupported scheme {:?}", scheme)));
        };

        let mut params = BTreeMap::new();
        for segment in split_params(rest)? {
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment.split_once('=').ok_or_else(|| {
                RegistryError::Challenge(format!("malformed parameter {:?}: expected key=\"value\"", segment))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(RegistryError::Challenge(format!(
                    "malformed parameter {:?}: empty key",
                    segment
                )));
            }

            let value = parse_value(value.trim()).ok_or_else(|| {
                RegistryError::Challenge(format!(
                    "malformed parameter {:?}: value must be a token or a quoted string",
                    segment
                ))
            })?;
            params.insert(key.to_string(), value.to_string());
        }

        Ok(Self { scheme, params })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }
}

impl FromStr for AuthChallenge {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split on commas that are not inside a quoted value
fn split_params(s: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err(RegistryError::Challenge(format!(
            "malformed parameter {:?}: unterminated quoted string",
            s[start..].trim()
        )));
    }
    parts.push(s[start..].trim());
    Ok(parts)
}

/// Quoted strings may hold anything; bare tokens may not contain `=` or quotes
fn parse_value(value: &str) -> Option<&str> {
    match value.strip_prefix('"') {
        Some(quoted) => quoted.strip_suffix('"').filter(|inner| !inner.contains('"')),
        None if value.contains(['=', '"']) => None,
        None => Some(value),
    }
}
