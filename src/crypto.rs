//! Cryptographic utilities for MAPI authentication
//!
//! MAPI protocol 9 never sends the password itself. The server stores a hash
//! of the password (the algorithm is announced in the challenge) and the
//! client proves knowledge of it with
//!
//! ```text
//! digest = hex(ALGO(hex(PWHASH(password)) || salt))
//! ```
//!
//! where `ALGO` is negotiated from the challenge's hash list.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// Digest algorithms this driver can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-512
    Sha512,
    /// SHA-384
    Sha384,
    /// SHA-256
    Sha256,
    /// SHA-224
    Sha224,
    /// SHA-1
    Sha1,
    /// MD5
    Md5,
}

impl HashAlgorithm {
    /// Client preference order, strongest first
    pub const PREFERENCE: [HashAlgorithm; 6] = [
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha1,
        HashAlgorithm::Md5,
    ];

    /// Name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "SHA512",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha224 => "SHA224",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Md5 => "MD5",
        }
    }

    /// Hash `data` and return the lowercase hex digest
    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha224 => hex::encode(Sha224::digest(data)),
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA512" => Ok(HashAlgorithm::Sha512),
            "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA224" => Ok(HashAlgorithm::Sha224),
            "SHA1" => Ok(HashAlgorithm::Sha1),
            "MD5" => Ok(HashAlgorithm::Md5),
            other => Err(Error::InvalidConfig(format!(
                "unsupported hash algorithm: {}",
                other
            ))),
        }
    }
}

/// Pick the digest algorithm for the handshake
///
/// With `preferred` set only that algorithm is acceptable. Otherwise the
/// strongest algorithm from [`HashAlgorithm::PREFERENCE`] that the server
/// lists wins. Server entries we cannot compute (e.g. `RIPEMD160`) are
/// ignored.
pub fn negotiate(server_list: &[String], preferred: Option<HashAlgorithm>) -> Result<HashAlgorithm> {
    let offered: Vec<HashAlgorithm> = server_list
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect();

    let candidates: &[HashAlgorithm] = match &preferred {
        Some(algorithm) => std::slice::from_ref(algorithm),
        None => &HashAlgorithm::PREFERENCE,
    };

    candidates
        .iter()
        .copied()
        .find(|algorithm| offered.contains(algorithm))
        .ok_or_else(|| Error::NoCommonHashAlgorithm {
            server: server_list.join(","),
        })
}

/// Compute the challenge response digest
///
/// `password_hash` is the algorithm the server stores passwords with;
/// `algorithm` is the negotiated challenge algorithm.
pub fn password_digest(
    algorithm: HashAlgorithm,
    password_hash: HashAlgorithm,
    password: &str,
    salt: &str,
) -> String {
    let mut hashed = password_hash.hex_digest(password.as_bytes()).into_bytes();
    hashed.extend_from_slice(salt.as_bytes());
    let digest = algorithm.hex_digest(&hashed);
    hashed.fill(0);
    digest
}
