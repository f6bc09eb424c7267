//! Signed exchange format versions

use super::mice::{IntegrityEncoder, MiSha256};

/// Supported signed exchange versions. Only the current draft is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    B3,
}

impl Version {
    /// Most recent supported version, advertised in `Accept`
    pub const LATEST: Version = Version::B3;

    pub fn magic(&self) -> &'static [u8] {
        match self {
            Version::B3 => b"sxg1-b3\0",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Version::B3 => "application/signed-exchange;v=b3",
        }
    }

    /// Context string prefixed to the signed message
    pub fn signature_context(&self) -> &'static [u8] {
        match self {
            Version::B3 => b"HTTP Exchange 1 b3",
        }
    }

    /// Value of the `integrity` signature parameter for this version
    pub fn integrity_label(&self) -> &'static str {
        match self {
            Version::B3 => "digest/mi-sha256-03",
        }
    }

    /// Integrity encoding the payload of this version is wrapped in
    pub fn mice_encoding(&self) -> &'static dyn IntegrityEncoder {
        match self {
            Version::B3 => &MiSha256,
        }
    }

    /// Identify the version from the leading magic bytes
    pub fn from_magic(bytes: &[u8]) -> Option<Version> {
        [Version::B3]
            .into_iter()
            .find(|v| bytes.starts_with(v.magic()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_magic() {
        assert_eq!(Version::from_magic(b"sxg1-b3\0rest"), Some(Version::B3));
        assert_eq!(Version::from_magic(b"sxg1-b2\0rest"), None);
        assert_eq!(Version::from_magic(b"sxg"), None);
    }

    #[test]
    fn test_mice_encoding_matches_integrity_label() {
        let (encoded, digest) = Version::B3.mice_encoding().encode(b"hello", 4);
        assert!(Version::B3.integrity_label().ends_with("mi-sha256-03"));
        assert!(digest.starts_with("mi-sha256-03="));
        assert_eq!(
            Version::B3.mice_encoding().decode(&encoded, &digest).unwrap(),
            b"hello"
        );
    }
}
