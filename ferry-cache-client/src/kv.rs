// SPDX-License-Identifier: MIT

//! Line-oriented `Key: Value` blobs.
//!
//! The wire format used by cache info and narinfo responses: one
//! `Key: Value` pair per line, keys never contain a colon, values run to
//! the end of the line. Leading blank lines are tolerated.

use crate::error::KvError;

/// An insertion-ordered key-value map. Duplicate keys keep their original
/// position; the last value written wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvBlob {
    entries: Vec<(String, String)>,
}

impl KvBlob {
    pub fn parse_bytes(input: &[u8]) -> Result<Self, KvError> {
        let text = std::str::from_utf8(input).map_err(|_| KvError::NotUtf8)?;
        Self::parse(text)
    }

    pub fn parse(input: &str) -> Result<Self, KvError> {
        let mut blob = KvBlob::default();
        let mut in_leading_blank = true;

        for (idx, line) in input.lines().enumerate() {
            if in_leading_blank && line.trim().is_empty() {
                continue;
            }
            in_leading_blank = false;

            let (key, value) = line.split_once(':').ok_or_else(|| KvError::BadKvBlob {
                line: idx + 1,
                reason: "no ':' separator".to_string(),
            })?;
            if key.is_empty() {
                return Err(KvError::BadKvBlob {
                    line: idx + 1,
                    reason: "empty key".to_string(),
                });
            }
            let value = value.trim_start_matches(' ');
            if value.is_empty() {
                return Err(KvError::BadKvBlob {
                    line: idx + 1,
                    reason: format!("no value for key '{key}'"),
                });
            }
            blob.insert(key, value);
        }

        Ok(blob)
    }

    /// Insert a pair; an existing key keeps its position and takes the new
    /// value.
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_simple_blob() {
        let blob = KvBlob::parse("StoreDir: /nix/store\nWantMassQuery: 1\n").unwrap();
        assert_eq!(blob.get("StoreDir"), Some("/nix/store"));
        assert_eq!(blob.get("WantMassQuery"), Some("1"));
        assert_eq!(blob.get("Priority"), None);
    }

    #[test]
    fn skips_leading_blank_lines() {
        let blob = KvBlob::parse("\n  \nKey: value\n").unwrap();
        assert_eq!(blob.get("Key"), Some("value"));
    }

    #[test]
    fn duplicate_key_last_write_wins() {
        let blob = KvBlob::parse("A: 1\nB: 2\nA: 3\n").unwrap();
        assert_eq!(blob.get("A"), Some("3"));
        // position of the first write is kept
        let keys: Vec<&str> = blob.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn value_may_contain_colons_and_spaces() {
        let blob = KvBlob::parse("NarHash: sha256:abc def\n").unwrap();
        assert_eq!(blob.get("NarHash"), Some("sha256:abc def"));
    }

    #[test]
    fn rejects_separator_free_line() {
        assert!(matches!(
            KvBlob::parse("Key: v\ngarbage\n"),
            Err(KvError::BadKvBlob { line: 2, .. })
        ));
    }

    #[test]
    fn rejects_missing_value() {
        assert!(KvBlob::parse("Key:   \n").is_err());
    }

    proptest! {
        /// parse ∘ serialize is the identity on parsed blobs.
        #[test]
        fn proptest_parse_serialize_idempotent(
            pairs in proptest::collection::vec(("[A-Za-z][A-Za-z0-9]{0,10}", "[ -~]{1,20}"), 0..8)
        ) {
            let mut input = String::new();
            for (k, v) in &pairs {
                // ensure the value survives the SPACE* rule
                let v = v.trim_start_matches(' ');
                if v.is_empty() {
                    continue;
                }
                input.push_str(&format!("{k}: {v}\n"));
            }
            let parsed = KvBlob::parse(&input).unwrap();
            let reparsed = KvBlob::parse(&parsed.serialize()).unwrap();
            prop_assert_eq!(parsed, reparsed);
        }
    }
}
