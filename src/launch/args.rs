//! Parsing of replacement launch argument vectors
//!
//! A container started with an explicit command replaces the whole
//! default argument list, e.g.
//! `app.py --server.port=9000 --server.address=127.0.0.1`.
//! The recognised pieces are lifted into named fields; everything else
//! is handed to the application untouched. Arguments after a bare `--`
//! belong to the entry script and keep their separator.

use crate::error::{BerthError, BerthResult};
use std::net::IpAddr;

const PORT_FLAG: &str = "--server.port";
const ADDRESS_FLAG: &str = "--server.address";

/// Launch values supplied at container start, each optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOverrides {
    pub entry: Option<String>,
    pub port: Option<u16>,
    pub address: Option<IpAddr>,

    /// Unrecognised server flags, passed through verbatim
    pub extra: Vec<String>,

    /// Script arguments that followed a bare `--`
    pub passthrough: Vec<String>,
}

impl LaunchOverrides {
    /// Parse a replacement argument vector.
    ///
    /// The first argument, if it is not a flag, names the entry file.
    /// `--server.port` and `--server.address` accept both the `=value`
    /// and the two-token form; a repeated flag keeps its last value.
    /// Everything after a bare `--` is kept apart as script arguments
    /// and never parsed as a server flag.
    pub fn from_argv(argv: &[String]) -> BerthResult<Self> {
        let mut overrides = Self::default();
        let mut tokens = argv.iter().enumerate();

        while let Some((index, token)) = tokens.next() {
            if token == "--" {
                overrides.passthrough = tokens.by_ref().map(|(_, t)| t.clone()).collect();
                break;
            }

            if index == 0 && !token.starts_with('-') {
                overrides.entry = Some(token.clone());
                continue;
            }

            let (flag, inline) = match token.split_once('=') {
                Some((flag, value)) => (flag, Some(value.to_string())),
                None => (token.as_str(), None),
            };

            if flag != PORT_FLAG && flag != ADDRESS_FLAG {
                overrides.extra.push(token.clone());
                continue;
            }

            let value = match inline {
                Some(value) => value,
                None => tokens.next().map(|(_, t)| t.clone()).ok_or_else(|| {
                    BerthError::LaunchInvalid(format!("{} requires a value", flag))
                })?,
            };

            if flag == PORT_FLAG {
                overrides.port = Some(parse_port(&value)?);
            } else {
                overrides.address = Some(parse_address(&value)?);
            }
        }

        Ok(overrides)
    }

    /// Fill every unset field from `fallback`; argument lists are kept
    /// from `self` when present
    pub fn or(self, fallback: Self) -> Self {
        Self {
            entry: self.entry.or(fallback.entry),
            port: self.port.or(fallback.port),
            address: self.address.or(fallback.address),
            extra: non_empty_or(self.extra, fallback.extra),
            passthrough: non_empty_or(self.passthrough, fallback.passthrough),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) fn non_empty_or(args: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    if args.is_empty() {
        fallback
    } else {
        args
    }
}

/// Parse a TCP port; zero and non-numeric values are rejected
pub fn parse_port(value: &str) -> BerthResult<u16> {
    match value.trim().parse::<u16>() {
        Ok(0) => Err(BerthError::LaunchInvalid(
            "port must be between 1 and 65535".to_string(),
        )),
        Ok(port) => Ok(port),
        Err(_) => Err(BerthError::LaunchInvalid(format!("invalid port '{}'", value))),
    }
}

/// Parse a bind address (IPv4 or IPv6 literal)
pub fn parse_address(value: &str) -> BerthResult<IpAddr> {
    value
        .trim()
        .parse()
        .map_err(|_| BerthError::LaunchInvalid(format!("invalid bind address '{}'", value)))
}
