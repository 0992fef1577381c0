//! INET values: an IP address with an optional prefix length

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Network address as stored in an `inet` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inet {
    /// Host or network address
    pub addr: IpAddr,
    /// Prefix length, when given as `addr/len`
    pub prefix: Option<u8>,
}

impl FromStr for Inet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let conversion_error = || Error::DataConversion {
            value: s.to_string(),
            type_name: "inet".to_string(),
        };

        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };

        let addr: IpAddr = addr.parse().map_err(|_| conversion_error())?;
        let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => {
                let p: u8 = p.parse().map_err(|_| conversion_error())?;
                if p > max_prefix {
                    return Err(conversion_error());
                }
                Some(p)
            }
            None => None,
        };

        Ok(Inet { addr, prefix })
    }
}

impl fmt::Display for Inet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Some(p) => write!(f, "{}/{}", self.addr, p),
            None => write!(f, "{}", self.addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inet() {
        let inet: Inet = "192.168.1.0/24".parse().unwrap();
        assert_eq!(inet.prefix, Some(24));
        assert_eq!(inet.to_string(), "192.168.1.0/24");

        let inet: Inet = "10.0.0.1".parse().unwrap();
        assert_eq!(inet.prefix, None);
    }

    #[test]
    fn test_parse_inet_errors() {
        assert!("300.1.1.1".parse::<Inet>().is_err());
        assert!("10.0.0.1/33".parse::<Inet>().is_err());
        assert!("10.0.0.1/x".parse::<Inet>().is_err());
    }
}
