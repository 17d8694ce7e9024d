//! Parsing of the fixed delivery URL

use thiserror_no_std::Error;

pub const HTTPS_DEFAULT_PORT: u16 = 443;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    #[error("only https:// endpoints are supported")]
    UnsupportedScheme,
    #[error("endpoint URL has no host")]
    MissingHost,
    #[error("endpoint URL has an invalid port")]
    InvalidPort,
}

/// Components of an `https://host[:port][/path]` URL, borrowed from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Request target including any query string; always starts with `/`
    pub path: &'a str,
}

impl<'a> Endpoint<'a> {
    pub fn parse(url: &'a str) -> Result<Self, EndpointError> {
        let rest = strip_scheme(url.trim()).ok_or(EndpointError::UnsupportedScheme)?;

        let (authority, path) = match rest.find(['/', '?']) {
            Some(idx) if rest.as_bytes()[idx] == b'/' => (&rest[..idx], &rest[idx..]),
            // A query without a path is not a valid request target.
            Some(_) => return Err(EndpointError::MissingHost),
            None => (rest, "/"),
        };

        // Credentials in the authority are not supported.
        if authority.contains('@') {
            return Err(EndpointError::MissingHost);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)?),
            None => (authority, HTTPS_DEFAULT_PORT),
        };

        if host.is_empty() || host.starts_with('[') {
            return Err(EndpointError::MissingHost);
        }

        Ok(Self { host, port, path })
    }
}

fn strip_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    scheme.eq_ignore_ascii_case("https").then_some(rest)
}

fn parse_port(port: &str) -> Result<u16, EndpointError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(EndpointError::InvalidPort),
        Ok(port) => Ok(port),
    }
}
