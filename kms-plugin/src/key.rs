// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Address of one key version in the remote KMS, written as
/// `{projectId}/{keyRingId}/{keyId}/{version}`.
///
/// Segments may be empty but never contain `/`, so [`fmt::Display`] gives
/// back exactly the string the address was parsed from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyAddress {
    pub project_id: String,
    pub key_ring_id: String,
    pub key_id: String,
    pub version: String,
}

impl KeyAddress {
    pub fn parse(key: &str) -> Result<Self> {
        let mut segments = key.split('/');
        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(project_id), Some(key_ring_id), Some(key_id), Some(version), None) => Ok(Self {
                project_id: project_id.to_string(),
                key_ring_id: key_ring_id.to_string(),
                key_id: key_id.to_string(),
                version: version.to_string(),
            }),
            _ => Err(Error::KeyFormat(key.to_string())),
        }
    }

    /// Segments in resource-path order.
    pub fn segments(&self) -> [&str; 4] {
        [
            self.project_id.as_str(),
            self.key_ring_id.as_str(),
            self.key_id.as_str(),
            self.version.as_str(),
        ]
    }
}

impl FromStr for KeyAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project_id, self.key_ring_id, self.key_id, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("p1/kr1/k1/v1")]
    #[case("project/keyring/key/version")]
    #[case("3644bde4-00c1-5e65/ring/key-1/1")]
    #[case("///")]
    #[case("p//k/")]
    fn parse_and_display(#[case] key: &str) {
        let addr = KeyAddress::parse(key).unwrap();
        assert_eq!(addr.to_string(), key);
        assert_eq!(KeyAddress::parse(&addr.to_string()).unwrap(), addr);
    }

    #[test]
    fn fields_in_order() {
        let addr: KeyAddress = "p1/kr1/k1/v1".parse().unwrap();
        assert_eq!(addr.project_id, "p1");
        assert_eq!(addr.key_ring_id, "kr1");
        assert_eq!(addr.key_id, "k1");
        assert_eq!(addr.version, "v1");
        assert_eq!(addr.segments(), ["p1", "kr1", "k1", "v1"]);
    }

    #[rstest]
    #[case("")]
    #[case("onlytwo/segments")]
    #[case("a/b/c")]
    #[case("a/b/c/d/e")]
    #[case("a/b/c/d/")]
    #[case("/a/b/c/d")]
    fn reject_wrong_segment_count(#[case] key: &str) {
        let err = KeyAddress::parse(key).unwrap_err();
        assert!(matches!(&err, Error::KeyFormat(k) if k == key));
        assert_eq!(err.to_string(), format!("key is in unknown format: {key}"));
    }
}
