//! Content keys and key ids.

use std::fmt;

/// A normalized, lowercase, 32-hex-character key id.
///
/// The manifest and PSSH box formats disagree on byte order: Widevine PSSH
/// boxes carry the KID in the same big-endian order the license server
/// expects, while many DASH manifests embed it as a little-endian UUID
/// (`cenc:default_KID`) that needs reversing per RFC 4122 before use.
/// `Kid::from_uuid_le` performs that one normalization; any further,
/// service-specific reordering (for example the Netflix quirk noted in
/// `SPEC_FULL.md`) is applied by the caller before constructing a `Kid`, not
/// inside this type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Kid(String);

impl Kid {
    pub fn from_hex(hex: &str) -> Option<Self> {
        let cleaned: String = hex.chars().filter(|c| *c != '-').collect();
        if cleaned.len() != 32 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Kid(cleaned.to_ascii_lowercase()))
    }

    /// Normalize a little-endian UUID (as found in `cenc:default_KID`) into
    /// the big-endian byte order used by license servers.
    pub fn from_uuid_le(bytes: &[u8; 16]) -> Self {
        let mut be = [0u8; 16];
        be[0] = bytes[3]; be[1] = bytes[2]; be[2] = bytes[1]; be[3] = bytes[0];
        be[4] = bytes[5]; be[5] = bytes[4];
        be[6] = bytes[7]; be[7] = bytes[6];
        be[8..16].copy_from_slice(&bytes[8..16]);
        Kid(hex::encode(be))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kid({})", self.0)
    }
}

impl fmt::Display for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved content key: a key id paired with the clear key bytes
/// obtained either statically, from a vault, or from a CDM license.
#[derive(Clone)]
pub struct ContentKey {
    pub kid: Kid,
    pub key: String,
}

impl ContentKey {
    pub fn new(kid: Kid, key: impl Into<String>) -> Self {
        ContentKey { kid, key: key.into() }
    }

    /// The well-known Amazon HDCP watermark key, present in some manifests
    /// purely to exercise HDCP enforcement. It never decrypts real content
    /// and is filtered out before key acquisition (spec §4.4).
    pub fn is_hdcp_test_key(kid: &Kid) -> bool {
        kid.as_hex() == "b770d5b4bb6b594daf985845aae9aa5f"
    }
}

mod hex {
    pub fn encode(bytes: [u8; 16]) -> String {
        let mut s = String::with_capacity(32);
        for b in bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}
