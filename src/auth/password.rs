use std::{fmt, str::FromStr};

use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

/// Bytes of randomness in a freshly generated salt (hex-encoded to twice that).
pub const SALT_BYTES: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("salt must not be empty")]
    EmptySalt,
    #[error("unsupported digest: {0}")]
    UnsupportedDigest(String),
    #[error("invalid password hashing parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Digest used as the PBKDF2 PRF (always HMAC-wrapped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordDigest {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for PasswordDigest {
    type Err = PasswordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(PasswordError::UnsupportedDigest(s.to_string())),
        }
    }
}

impl fmt::Display for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// Process-wide key derivation settings. Built once at startup.
#[derive(Clone)]
pub struct PasswordConfig {
    pepper: String,
    iteration: u32,
    keylen: usize,
    digest: PasswordDigest,
}

impl PasswordConfig {
    pub fn new(
        pepper: impl Into<String>,
        iteration: u32,
        keylen: usize,
        digest: PasswordDigest,
    ) -> Result<Self, PasswordError> {
        let pepper = pepper.into();
        if pepper.is_empty() {
            return Err(PasswordError::InvalidParameter("pepper"));
        }
        if iteration == 0 {
            return Err(PasswordError::InvalidParameter("iteration"));
        }
        if keylen == 0 {
            return Err(PasswordError::InvalidParameter("keylen"));
        }
        Ok(Self {
            pepper,
            iteration,
            keylen,
            digest,
        })
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn keylen(&self) -> usize {
        self.keylen
    }

    pub fn digest(&self) -> PasswordDigest {
        self.digest
    }
}

// The pepper never reaches logs.
impl fmt::Debug for PasswordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordConfig")
            .field("pepper", &"<redacted>")
            .field("iteration", &self.iteration)
            .field("keylen", &self.keylen)
            .field("digest", &self.digest)
            .finish()
    }
}

/// A derived hash together with the salt it was derived from.
/// Both are hex strings and are persisted as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive a hash for `plain`. A fresh salt is generated when `salt` is `None`.
pub fn hash_password(
    config: &PasswordConfig,
    plain: &str,
    salt: Option<&str>,
) -> Result<HashedPassword, PasswordError> {
    if plain.is_empty() {
        return Err(PasswordError::EmptyPassword);
    }
    let salt = match salt {
        Some("") => return Err(PasswordError::EmptySalt),
        Some(s) => s.to_string(),
        None => generate_salt(),
    };

    let peppered = format!("{}{}", salt, config.pepper);
    let mut key = vec![0u8; config.keylen];
    let (pw, s, rounds) = (plain.as_bytes(), peppered.as_bytes(), config.iteration);
    match config.digest {
        PasswordDigest::Sha1 => pbkdf2_hmac::<Sha1>(pw, s, rounds, &mut key),
        PasswordDigest::Sha224 => pbkdf2_hmac::<Sha224>(pw, s, rounds, &mut key),
        PasswordDigest::Sha256 => pbkdf2_hmac::<Sha256>(pw, s, rounds, &mut key),
        PasswordDigest::Sha384 => pbkdf2_hmac::<Sha384>(pw, s, rounds, &mut key),
        PasswordDigest::Sha512 => pbkdf2_hmac::<Sha512>(pw, s, rounds, &mut key),
    }

    Ok(HashedPassword {
        hash: hex::encode(key),
        salt,
    })
}

/// Re-derive with the stored salt and compare in constant time.
pub fn verify_password(
    config: &PasswordConfig,
    plain: &str,
    stored_hash: &str,
    stored_salt: &str,
) -> Result<bool, PasswordError> {
    let derived = hash_password(config, plain, Some(stored_salt)).map_err(|e| {
        warn!(error = %e, "password verification could not derive hash");
        e
    })?;
    Ok(derived.hash.as_bytes().ct_eq(stored_hash.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps the suite fast; behavior is independent of it.
    fn config() -> PasswordConfig {
        PasswordConfig::new("test-pepper", 1_000, 64, PasswordDigest::Sha512).unwrap()
    }

    #[test]
    fn config_exposes_kdf_parameters() {
        let cfg = config();
        assert_eq!(cfg.iteration(), 1_000);
        assert_eq!(cfg.keylen(), 64);
        assert_eq!(cfg.digest().to_string(), "sha512");
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let cfg = config();
        let hashed = hash_password(&cfg, "Secur3P@ssw0rd!", None).expect("hashing should succeed");
        assert!(verify_password(&cfg, "Secur3P@ssw0rd!", &hashed.hash, &hashed.salt).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let cfg = config();
        let hashed = hash_password(&cfg, "correct-horse-battery-staple", None).unwrap();
        assert!(!verify_password(&cfg, "wrong-password", &hashed.hash, &hashed.salt).unwrap());
    }

    #[test]
    fn same_password_and_salt_is_deterministic() {
        let cfg = config();
        let a = hash_password(&cfg, "hunter2", Some("abcd")).unwrap();
        let b = hash_password(&cfg, "hunter2", Some("abcd")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.salt, "abcd");
    }

    #[test]
    fn different_salts_give_different_hashes() {
        let cfg = config();
        let a = hash_password(&cfg, "hunter2", None).unwrap();
        let b = hash_password(&cfg, "hunter2", None).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn generated_salt_is_hex_of_fixed_length() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_BYTES * 2);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_length_follows_keylen() {
        let cfg = PasswordConfig::new("p", 10, 32, PasswordDigest::Sha256).unwrap();
        let hashed = hash_password(&cfg, "pw", Some("salt")).unwrap();
        assert_eq!(hashed.hash.len(), 64);
    }

    #[test]
    fn every_kdf_parameter_changes_the_output() {
        let base = PasswordConfig::new("pepper", 100, 32, PasswordDigest::Sha256).unwrap();
        let reference = hash_password(&base, "pw", Some("salt")).unwrap().hash;

        let variants = [
            PasswordConfig::new("pepper", 101, 32, PasswordDigest::Sha256).unwrap(),
            PasswordConfig::new("pepper", 100, 33, PasswordDigest::Sha256).unwrap(),
            PasswordConfig::new("pepper", 100, 32, PasswordDigest::Sha512).unwrap(),
            PasswordConfig::new("other-pepper", 100, 32, PasswordDigest::Sha256).unwrap(),
        ];
        for cfg in &variants {
            let hash = hash_password(cfg, "pw", Some("salt")).unwrap().hash;
            assert_ne!(hash, reference, "{:?} should change the hash", cfg);
        }
    }

    #[test]
    fn known_vector_sha256() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", 1, 64)
        // with the salt split between salt and pepper.
        let cfg = PasswordConfig::new("lt", 1, 64, PasswordDigest::Sha256).unwrap();
        let hashed = hash_password(&cfg, "passwd", Some("sa")).unwrap();
        assert_eq!(
            hashed.hash,
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc\
             49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
        );
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let cfg = config();
        assert_eq!(hash_password(&cfg, "", None), Err(PasswordError::EmptyPassword));
        assert_eq!(hash_password(&cfg, "pw", Some("")), Err(PasswordError::EmptySalt));
        assert_eq!(
            verify_password(&cfg, "", "00", "abcd"),
            Err(PasswordError::EmptyPassword)
        );
    }

    #[test]
    fn verify_is_false_for_truncated_or_recased_hash() {
        let cfg = config();
        let hashed = hash_password(&cfg, "pw", None).unwrap();
        let truncated = &hashed.hash[..hashed.hash.len() - 2];
        assert!(!verify_password(&cfg, "pw", truncated, &hashed.salt).unwrap());
        let upper = hashed.hash.to_uppercase();
        assert!(!verify_password(&cfg, "pw", &upper, &hashed.salt).unwrap());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            PasswordConfig::new("", 1, 1, PasswordDigest::Sha1).unwrap_err(),
            PasswordError::InvalidParameter("pepper")
        );
        assert_eq!(
            PasswordConfig::new("p", 0, 1, PasswordDigest::Sha1).unwrap_err(),
            PasswordError::InvalidParameter("iteration")
        );
        assert_eq!(
            PasswordConfig::new("p", 1, 0, PasswordDigest::Sha1).unwrap_err(),
            PasswordError::InvalidParameter("keylen")
        );
    }

    #[test]
    fn digest_names_parse_loosely() {
        assert_eq!("sha512".parse::<PasswordDigest>(), Ok(PasswordDigest::Sha512));
        assert_eq!("SHA-256".parse::<PasswordDigest>(), Ok(PasswordDigest::Sha256));
        assert_eq!(" sha1 ".parse::<PasswordDigest>(), Ok(PasswordDigest::Sha1));
        assert_eq!(
            "md5".parse::<PasswordDigest>(),
            Err(PasswordError::UnsupportedDigest("md5".into()))
        );
        assert_eq!(PasswordDigest::Sha384.to_string(), "sha384");
    }

    #[test]
    fn debug_output_hides_pepper() {
        let dbg = format!("{:?}", config());
        assert!(!dbg.contains("test-pepper"));
    }
}
