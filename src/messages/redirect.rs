//! Redirect lines in a handshake reply
//!
//! A server (usually `monetdbd`) may answer a login with one or more
//! redirect lines instead of a prompt:
//!
//! ```text
//! ^mapi:monetdb://db2.example.com:50001/demo?lang=sql&user=monetdb
//! ^mapi:merovingian://proxy?database=demo
//! ```
//!
//! The `monetdb` form means "open a new transport to this address"; the
//! `merovingian` form means "the proxy has taken over, restart the login on
//! the same transport".

use std::fmt;

use crate::constants::{DEFAULT_PORT, REDIRECT_SCHEME};
use crate::error::{Error, Result};

/// Where a redirect sends the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Reconnect to another server
    Server {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Database named in the target, if any
        database: Option<String>,
    },
    /// Restart the handshake on the current transport
    Proxy {
        /// Database named in the target, if any
        database: Option<String>,
    },
}

impl RedirectTarget {
    /// Parse a redirect target, with or without the leading `^`
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let line = line.strip_prefix('^').unwrap_or(line);
        let uri = line
            .strip_prefix(REDIRECT_SCHEME)
            .ok_or_else(|| Error::decode(format!("redirect without mapi scheme: {}", line)))?;

        if let Some(rest) = uri.strip_prefix("merovingian://") {
            let (_, query) = split_query(rest);
            return Ok(RedirectTarget::Proxy {
                database: query_param(query, "database"),
            });
        }

        let rest = uri
            .strip_prefix("monetdb://")
            .ok_or_else(|| Error::decode(format!("unsupported redirect target: {}", line)))?;
        let (rest, query) = split_query(rest);

        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (rest, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') => {
                let port = port
                    .parse()
                    .map_err(|_| Error::decode(format!("invalid redirect port: {}", port)))?;
                (host, port)
            }
            _ => (authority, DEFAULT_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::decode(format!("redirect without host: {}", line)));
        }

        let database = path
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| query_param(query, "database"));

        Ok(RedirectTarget::Server {
            host: host.to_string(),
            port,
            database,
        })
    }

    /// Database the redirect asks for, if it names one
    pub fn database(&self) -> Option<&str> {
        match self {
            RedirectTarget::Server { database, .. } | RedirectTarget::Proxy { database } => {
                database.as_deref()
            }
        }
    }

    /// Whether the redirect keeps the current transport
    pub fn is_proxy(&self) -> bool {
        matches!(self, RedirectTarget::Proxy { .. })
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectTarget::Server {
                host,
                port,
                database,
            } => write!(
                f,
                "mapi:monetdb://{}:{}/{}",
                host,
                port,
                database.as_deref().unwrap_or("")
            ),
            RedirectTarget::Proxy { database } => match database {
                Some(db) => write!(f, "mapi:merovingian://proxy?database={}", db),
                None => f.write_str("mapi:merovingian://proxy"),
            },
        }
    }
}

fn split_query(s: &str) -> (&str, &str) {
    s.split_once('?').unwrap_or((s, ""))
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_redirect() {
        let target =
            RedirectTarget::parse("^mapi:monetdb://db2.example.com:50001/demo?lang=sql&user=monetdb")
                .unwrap();
        assert_eq!(
            target,
            RedirectTarget::Server {
                host: "db2.example.com".into(),
                port: 50001,
                database: Some("demo".into()),
            }
        );
        assert!(!target.is_proxy());
    }

    #[test]
    fn test_parse_proxy_redirect() {
        let target = RedirectTarget::parse("^mapi:merovingian://proxy?database=demo").unwrap();
        assert!(target.is_proxy());
        assert_eq!(target.database(), Some("demo"));
    }

    #[test]
    fn test_parse_default_port() {
        let target = RedirectTarget::parse("mapi:monetdb://localhost/voc").unwrap();
        assert!(matches!(target, RedirectTarget::Server { port: DEFAULT_PORT, .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(RedirectTarget::parse("^http://example.com").is_err());
        assert!(RedirectTarget::parse("^mapi:postgres://x").is_err());
        assert!(RedirectTarget::parse("^mapi:monetdb://host:abc/db").is_err());
    }

    #[test]
    fn test_display() {
        let target = RedirectTarget::Server {
            host: "h".into(),
            port: 1,
            database: Some("d".into()),
        };
        assert_eq!(target.to_string(), "mapi:monetdb://h:1/d");
    }
}
