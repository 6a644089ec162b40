//! INFO and META chunk payloads

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// INFO payload size without the hard-sector byte (older producers).
pub const INFO_LEN_V2: usize = 36;
pub const INFO_LEN_V3: usize = 37;

/// Fixed-layout INFO chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoChunk {
    pub version: u8,
    /// Name of the tool that produced the image (32 bytes, space padded)
    pub creator: String,
    pub drive_type: u8,
    pub write_protected: bool,
    pub synchronized: bool,
    pub hard_sector_count: u8,
}

impl InfoChunk {
    pub fn parse(payload: &[u8]) -> Result<Self, ApiError> {
        if payload.len() < INFO_LEN_V2 {
            return Err(ApiError::MalformedChunk {
                tag: "INFO".to_string(),
                reason: format!(
                    "payload is {} bytes, need at least {}",
                    payload.len(),
                    INFO_LEN_V2
                ),
            });
        }

        let creator = String::from_utf8_lossy(&payload[1..33])
            .trim_end_matches(&[' ', '\0'][..])
            .to_string();

        Ok(Self {
            version: payload[0],
            creator,
            drive_type: payload[33],
            write_protected: payload[34] != 0,
            synchronized: payload[35] != 0,
            hard_sector_count: payload.get(36).copied().unwrap_or(0),
        })
    }

    pub fn drive_name(&self) -> Option<&'static str> {
        drive_type_name(self.drive_type)
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("version".to_string(), self.version.to_string());
        map.insert("creator".to_string(), self.creator.clone());
        map.insert("drive_type".to_string(), self.drive_type.to_string());
        if let Some(name) = self.drive_name() {
            map.insert("drive_name".to_string(), name.to_string());
        }
        map.insert(
            "write_protected".to_string(),
            self.write_protected.to_string(),
        );
        map.insert("synchronized".to_string(), self.synchronized.to_string());
        map.insert(
            "hard_sector_count".to_string(),
            self.hard_sector_count.to_string(),
        );
        map
    }
}

pub fn drive_type_name(drive_type: u8) -> Option<&'static str> {
    match drive_type {
        1 => Some("5.25\" SS 40trk 0.25 step"),
        2 => Some("3.5\" DS 80trk Apple CLV"),
        3 => Some("5.25\" DS 80trk"),
        4 => Some("5.25\" DS 40trk"),
        5 => Some("3.5\" DS 80trk"),
        6 => Some("8\" DS"),
        7 => Some("3\" DS 80trk"),
        8 => Some("3\" DS 40trk"),
        _ => None,
    }
}

/// Parse META text into key/value pairs.
///
/// Lines are `key<TAB>value`; lines without a tab fall back to `key:value`.
/// Blank keys and lines without a separator are ignored. Later keys win.
pub fn parse_meta(payload: &[u8]) -> Result<BTreeMap<String, String>, ApiError> {
    let text = std::str::from_utf8(payload).map_err(|e| ApiError::MalformedChunk {
        tag: "META".to_string(),
        reason: format!("not UTF-8: {}", e),
    })?;

    let mut map = BTreeMap::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        let pair = line.split_once('\t').or_else(|| line.split_once(':'));
        if let Some((key, value)) = pair {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), value.trim().to_string());
        }
    }
    Ok(map)
}

/// Typed accessors over META pairs.
pub struct MetaChunk<'a> {
    pairs: &'a BTreeMap<String, String>,
}

macro_rules! meta_field {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> Option<&'a str> {
                self.get(stringify!($name))
            }
        )*
    };
}

impl<'a> MetaChunk<'a> {
    pub fn new(pairs: &'a BTreeMap<String, String>) -> Self {
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    meta_field!(
        title,
        subtitle,
        publisher,
        developer,
        copyright,
        version,
        language,
        requires_platform,
        requires_machine,
        requires_ram,
        notes,
        side,
        side_name,
        contributor,
        image_date,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_payload(version: u8, with_hard_sectors: bool) -> Vec<u8> {
        let mut payload = vec![version];
        let mut creator = b"Applesauce v1.3".to_vec();
        creator.resize(32, b' ');
        payload.extend_from_slice(&creator);
        payload.extend_from_slice(&[3, 1, 0]);
        if with_hard_sectors {
            payload.push(16);
        }
        payload
    }

    #[test]
    fn test_parse_info_v3() {
        let info = InfoChunk::parse(&info_payload(1, true)).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.creator, "Applesauce v1.3");
        assert_eq!(info.drive_type, 3);
        assert!(info.write_protected);
        assert!(!info.synchronized);
        assert_eq!(info.hard_sector_count, 16);
        assert_eq!(info.drive_name(), Some("5.25\" DS 80trk"));
    }

    #[test]
    fn test_parse_info_without_hard_sector_byte() {
        let info = InfoChunk::parse(&info_payload(1, false)).unwrap();
        assert_eq!(info.hard_sector_count, 0);
        assert_eq!(info.to_map()["creator"], "Applesauce v1.3");
    }

    #[test]
    fn test_short_info_is_malformed() {
        let err = InfoChunk::parse(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ApiError::MalformedChunk { .. }));
    }

    #[test]
    fn test_parse_meta_tab_and_colon() {
        let meta = parse_meta(
            b"title\tWordPerfect\npublisher\tSSI\nside: A\n\nnonsense line\nlanguage\tEnglish\r\n",
        )
        .unwrap();
        assert_eq!(meta["title"], "WordPerfect");
        assert_eq!(meta["publisher"], "SSI");
        assert_eq!(meta["side"], "A");
        assert_eq!(meta["language"], "English");
        assert_eq!(meta.len(), 4);

        let typed = MetaChunk::new(&meta);
        assert_eq!(typed.title(), Some("WordPerfect"));
        assert_eq!(typed.developer(), None);
    }

    #[test]
    fn test_tab_wins_over_colon_in_value() {
        let meta = parse_meta(b"image_date\t2023-11-13T10:22:00Z\n").unwrap();
        assert_eq!(meta["image_date"], "2023-11-13T10:22:00Z");
    }

    #[test]
    fn test_meta_rejects_invalid_utf8() {
        assert!(parse_meta(&[0xff, 0xfe, b'\t']).is_err());
    }
}
