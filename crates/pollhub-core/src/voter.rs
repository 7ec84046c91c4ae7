use std::fmt;
use std::net::IpAddr;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Anonymous-voter marker derived from the caller's network origin.
///
/// This is a deterrent, not a security boundary: anyone who can change their
/// address (or sits behind a shared NAT with other voters) defeats it or is
/// wrongly blocked by it. Only the SHA-256 of the canonical address is kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_ip(ip: IpAddr) -> Self {
        // ::ffff:a.b.c.d and a.b.c.d are the same origin
        let canonical = ip.to_canonical();
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Self(hex::encode(digest))
    }

    /// Rebuild a fingerprint that was previously persisted.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is casting a vote. Authenticated users and anonymous origins live in
/// separate namespaces and are recorded in separate sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Voter {
    User(Uuid),
    Anonymous(Fingerprint),
}

impl fmt::Display for Voter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Voter::User(id) => write!(f, "user:{}", id),
            Voter::Anonymous(fp) => write!(f, "anon:{:.12}", fp.as_str()),
        }
    }
}
