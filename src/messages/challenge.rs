//! Server login challenge
//!
//! The first message on a fresh transport is a colon-separated challenge:
//!
//! ```text
//! salt:server_type:protocol:hash_list:endianness:password_hash:[extra:...]
//! eH5tcRJ:merovingian:9:RIPEMD160,SHA512,SHA256,SHA1:LIT:SHA512:
//! ```

use crate::constants::{endian, PROTOCOL_VERSION};
use crate::crypto::HashAlgorithm;
use crate::error::{Error, Result};

/// Parsed login challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Random salt mixed into the digest
    pub salt: String,
    /// `mserver` or `merovingian`
    pub server_type: String,
    /// Protocol version, always `9` once parsed
    pub protocol: String,
    /// Digest algorithms the server accepts, in server order
    pub hash_algorithms: Vec<String>,
    /// Server byte order marker (`BIG` or `LIT`)
    pub endianness: String,
    /// Algorithm the server stores password hashes with
    pub password_hash: HashAlgorithm,
    /// Trailing optional fields such as `sql=6` or `BINARY=1`
    pub extra: Vec<String>,
}

impl Challenge {
    /// Parse a challenge message
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = text.split(':').collect();

        if fields.len() < 6 {
            return Err(Error::InvalidChallenge(format!(
                "expected at least 6 fields, got {}: {:?}",
                fields.len(),
                text
            )));
        }

        let protocol = fields[2];
        if protocol != PROTOCOL_VERSION {
            return Err(Error::UnsupportedProtocol(protocol.to_string()));
        }

        let salt = fields[0];
        if salt.is_empty() {
            return Err(Error::InvalidChallenge("empty salt".to_string()));
        }

        let endianness = fields[4];
        if endianness != endian::BIG && endianness != endian::LITTLE {
            return Err(Error::InvalidChallenge(format!(
                "unknown endianness marker: {}",
                endianness
            )));
        }

        let password_hash = fields[5].parse().map_err(|_| Error::NoCommonHashAlgorithm {
            server: fields[5].to_string(),
        })?;

        let hash_algorithms = fields[3]
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let extra = fields[6..]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Ok(Self {
            salt: salt.to_string(),
            server_type: fields[1].to_string(),
            protocol: protocol.to_string(),
            hash_algorithms,
            endianness: endianness.to_string(),
            password_hash,
            extra,
        })
    }

    /// Whether the challenge came from the `monetdbd` proxy
    pub fn is_proxy(&self) -> bool {
        self.server_type == "merovingian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let c = Challenge::parse("eH5tcRJ:merovingian:9:RIPEMD160,SHA512,SHA256,SHA1:LIT:SHA512:\n")
            .unwrap();
        assert_eq!(c.salt, "eH5tcRJ");
        assert!(c.is_proxy());
        assert_eq!(c.hash_algorithms, vec!["RIPEMD160", "SHA512", "SHA256", "SHA1"]);
        assert_eq!(c.endianness, "LIT");
        assert_eq!(c.password_hash, HashAlgorithm::Sha512);
        assert!(c.extra.is_empty());
    }

    #[test]
    fn test_parse_extra_fields() {
        let c = Challenge::parse("salt:mserver:9:SHA1:BIG:SHA512:sql=6:BINARY=1:").unwrap();
        assert_eq!(c.server_type, "mserver");
        assert_eq!(c.extra, vec!["sql=6", "BINARY=1"]);
    }

    #[test]
    fn test_reject_old_protocol() {
        let err = Challenge::parse("salt:mserver:8:SHA1:LIT:SHA512:").unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocol(ref v) if v == "8"));
    }

    #[test]
    fn test_reject_short_challenge() {
        assert!(matches!(
            Challenge::parse("salt:mserver:9"),
            Err(Error::InvalidChallenge(_))
        ));
    }

    #[test]
    fn test_reject_unknown_password_hash() {
        assert!(matches!(
            Challenge::parse("salt:mserver:9:SHA1:LIT:RIPEMD160:"),
            Err(Error::NoCommonHashAlgorithm { .. })
        ));
    }
}
