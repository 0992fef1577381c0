//! Integration tests for the login messages
//!
//! These tests verify challenge parsing, digest computation and reply
//! classification without a MonetDB server.

use monetdb_rs::config::Credentials;
use monetdb_rs::crypto::{negotiate, password_digest, HashAlgorithm};
use monetdb_rs::messages::{classify_failure, AuthMessage, AuthReply, Challenge, RedirectTarget};
use monetdb_rs::{Error, ErrorKind};

const SALT: &str = "s4lt";

mod digest_tests {
    use super::*;

    #[test]
    fn test_password_hash_is_hex_of_pwhash() {
        assert_eq!(
            HashAlgorithm::Sha512.hex_digest(b"monetdb"),
            "a73f1d86383446438ac64f56e15ada38b41fbb18f029d2181723aeb2acac6a831f60e5fdbd64ac2c8c70e035dd44cbbe3b45565ef2d58feb2821a2078c7fad35"
        );
    }

    #[test]
    fn test_known_challenge_digests() {
        assert_eq!(
            password_digest(HashAlgorithm::Sha256, HashAlgorithm::Sha512, "monetdb", SALT),
            "3e940bdebba384e92a8565a4079858201497af88952575fef136bd9c8e1a7169"
        );
        assert_eq!(
            password_digest(HashAlgorithm::Md5, HashAlgorithm::Sha512, "monetdb", SALT),
            "cfb11a870167c18aaf5122aafd286458"
        );
        assert_eq!(
            password_digest(HashAlgorithm::Sha1, HashAlgorithm::Sha1, "secret", "abc"),
            "b567fe90b8b604515dbcc1c67ec44173b89940d7"
        );
    }

    #[test]
    fn test_digest_depends_on_salt() {
        let a = password_digest(HashAlgorithm::Sha512, HashAlgorithm::Sha512, "pw", "salt-a");
        let b = password_digest(HashAlgorithm::Sha512, HashAlgorithm::Sha512, "pw", "salt-b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn test_negotiation_prefers_strongest() {
        let offered: Vec<String> = ["RIPEMD160", "SHA1", "SHA256", "MD5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(negotiate(&offered, None).unwrap(), HashAlgorithm::Sha256);
        assert_eq!(
            negotiate(&offered, Some(HashAlgorithm::Md5)).unwrap(),
            HashAlgorithm::Md5
        );

        let err = negotiate(&["RIPEMD160".to_string()], None).unwrap_err();
        assert!(matches!(err, Error::NoCommonHashAlgorithm { .. }));
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}

mod challenge_tests {
    use super::*;

    #[test]
    fn test_parse_merovingian_challenge() {
        let challenge =
            Challenge::parse("eH5tcRJ:merovingian:9:RIPEMD160,SHA512,SHA256,SHA1:LIT:SHA512:")
                .unwrap();
        assert_eq!(challenge.salt, "eH5tcRJ");
        assert!(challenge.is_proxy());
        assert_eq!(challenge.hash_algorithms.len(), 4);
        assert_eq!(challenge.password_hash, HashAlgorithm::Sha512);
        assert!(challenge.extra.is_empty());
    }

    #[test]
    fn test_parse_challenge_with_extra_fields() {
        let challenge =
            Challenge::parse("abc:mserver:9:SHA512:BIG:SHA512:sql=6:BINARY=1:\n").unwrap();
        assert!(!challenge.is_proxy());
        assert_eq!(challenge.endianness, "BIG");
        assert_eq!(challenge.extra, vec!["sql=6", "BINARY=1"]);
    }

    #[test]
    fn test_invalid_challenges() {
        assert!(matches!(
            Challenge::parse("abc:mserver:9"),
            Err(Error::InvalidChallenge(_))
        ));
        assert!(matches!(
            Challenge::parse("abc:mserver:8:SHA1:LIT:SHA512:"),
            Err(Error::UnsupportedProtocol(ref v)) if v == "8"
        ));
        assert!(matches!(
            Challenge::parse("abc:mserver:9:SHA1:MID:SHA512:"),
            Err(Error::InvalidChallenge(_))
        ));
        assert!(matches!(
            Challenge::parse("abc:mserver:9:SHA1:LIT:RIPEMD160:"),
            Err(Error::NoCommonHashAlgorithm { .. })
        ));
    }
}

mod response_tests {
    use super::*;

    #[test]
    fn test_login_response_layout() {
        let challenge = Challenge::parse("s4lt:mserver:9:SHA256,MD5:LIT:SHA512:").unwrap();
        let credentials = Credentials::new("monetdb", "monetdb");
        let msg = AuthMessage::build(&challenge, &credentials, "sql", "demo", None).unwrap();

        assert_eq!(msg.algorithm, HashAlgorithm::Sha256);
        let text = std::str::from_utf8(msg.as_bytes()).unwrap();
        let fields: Vec<&str> = text.split(':').collect();
        assert_eq!(fields[1], "monetdb");
        assert_eq!(
            fields[2],
            "{SHA256}3e940bdebba384e92a8565a4079858201497af88952575fef136bd9c8e1a7169"
        );
        assert_eq!(fields[3], "sql");
        assert_eq!(fields[4], "demo");
        assert_eq!(fields[5], "");
    }

    #[test]
    fn test_reply_ok_variants() {
        assert_eq!(AuthReply::parse("").unwrap(), AuthReply::Ok);
        assert_eq!(AuthReply::parse("=OK\n").unwrap(), AuthReply::Ok);
        assert_eq!(AuthReply::parse("#info\n\n").unwrap(), AuthReply::Ok);
    }

    #[test]
    fn test_reply_redirects() {
        let reply = AuthReply::parse("^mapi:merovingian://proxy?database=demo\n").unwrap();
        assert_eq!(
            reply,
            AuthReply::Redirect(RedirectTarget::Proxy {
                database: Some("demo".to_string())
            })
        );

        let reply = AuthReply::parse("^mapi:monetdb://db1.example.com:50001/sales\n").unwrap();
        let AuthReply::Redirect(target) = reply else {
            panic!("expected redirect");
        };
        assert_eq!(target.database(), Some("sales"));
        assert!(!target.is_proxy());
    }

    #[test]
    fn test_reply_errors_win_over_redirects() {
        let reply = AuthReply::parse("!no such database\n^mapi:monetdb://x:1/y\n").unwrap();
        assert!(matches!(reply, AuthReply::Failed(_)));
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            classify_failure("InvalidCredentialsException:checkCredentials:invalid credentials for user 'x'", "demo"),
            Error::InvalidCredentials(_)
        ));
        assert!(classify_failure("monetdbd: no such database 'demo', please create it first", "demo")
            .is_no_such_database());
        assert!(matches!(
            classify_failure("database 'demo' is under maintenance", "demo"),
            Error::AuthenticationFailed(_)
        ));
    }
}
