//! Core type definitions for the memory mesh.
//!
//! All types are serializable; timestamps are wall-clock UTC.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use ordered_float::OrderedFloat;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Namespace for content-derived memory IDs (UUIDv5).
const MEMORY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_7368_2d63_6f72_652d_6964_2d76_3531);

/// Namespace for ids from older save files that are neither UUIDs nor
/// 12-digit hex digests.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_7368_2d6c_6567_6163_792d_6964_7331);

/// Length of the hex digest ids written by older save files.
const LEGACY_HEX_LEN: usize = 12;

/// Stable identifier for a memory item.
///
/// New items get a UUIDv5 derived from their content and creation
/// timestamp, so the same `(content, created_at)` pair always yields the
/// same ID. Ids read from older save files are 12 lowercase hex digits;
/// those are kept as-is and written back unchanged. Any other non-UUID
/// string maps to a stable UUIDv5 of that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryId {
    /// Content-derived UUIDv5.
    Uuid(Uuid),
    /// 12-digit hex id from an older save file.
    Legacy(u64),
}

impl MemoryId {
    /// Derive the ID for `content` created at `created_at`.
    #[must_use]
    pub fn derive(content: &str, created_at: &DateTime<Utc>) -> Self {
        Self::derive_salted(content, created_at, 0)
    }

    /// Derive an ID with a collision salt. Salt `0` is the canonical ID.
    #[must_use]
    pub fn derive_salted(content: &str, created_at: &DateTime<Utc>, salt: u32) -> Self {
        let stamp = created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let name = if salt == 0 {
            format!("{content}{stamp}")
        } else {
            format!("{content}{stamp}#{salt}")
        };
        Self::Uuid(Uuid::new_v5(&MEMORY_ID_NAMESPACE, name.as_bytes()))
    }

    /// Read an ID as written on disk. Never fails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Ok(uuid) = Uuid::parse_str(raw) {
            return Self::Uuid(uuid);
        }
        let is_legacy_hex = raw.len() == LEGACY_HEX_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if is_legacy_hex {
            if let Ok(value) = u64::from_str_radix(raw, 16) {
                return Self::Legacy(value);
            }
        }
        Self::Uuid(Uuid::new_v5(&LEGACY_ID_NAMESPACE, raw.as_bytes()))
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "{uuid}"),
            Self::Legacy(value) => write!(f, "{value:012x}"),
        }
    }
}

impl Serialize for MemoryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = MemoryId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a memory id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MemoryId, E> {
                Ok(MemoryId::parse(v))
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

/// Serde adapters for timestamps.
///
/// Timestamps are written as RFC 3339. Reading also accepts ISO 8601 without
/// an offset, as older save files wrote them; those are taken as UTC.
pub mod timestamp {
    use std::collections::BTreeMap;

    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serialize, Serializer};

    use super::MemoryId;

    /// Parse an RFC 3339 or offset-less ISO 8601 timestamp.
    #[must_use]
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|at| at.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    /// Write as RFC 3339.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        at.serialize(serializer)
    }

    /// Read RFC 3339 or offset-less ISO 8601.
    ///
    /// # Errors
    /// Fails on anything that is not a timestamp string.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    #[derive(Deserialize)]
    struct Lenient(
        #[serde(deserialize_with = "crate::types::timestamp::deserialize")] DateTime<Utc>,
    );

    /// Read an id-keyed map of timestamps.
    ///
    /// # Errors
    /// Fails if any value is not a timestamp string.
    pub fn deserialize_map<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<MemoryId, DateTime<Utc>>, D::Error> {
        let raw = BTreeMap::<MemoryId, Lenient>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(id, Lenient(at))| (id, at)).collect())
    }
}

/// Open key-value bag attached to a memory (speaker, source project, ...).
///
/// Carried through unchanged; only the `type` and `speaker` keys are ever
/// inspected, and only for category hinting.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Relevance Score
// ---------------------------------------------------------------------------

/// Composite relevance score used to rank memories during retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelevanceScore(pub OrderedFloat<f64>);

impl RelevanceScore {
    /// Score of an item that does not match the query at all.
    pub const ZERO: Self = Self(OrderedFloat(0.0));

    /// Create a relevance score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

impl fmt::Display for RelevanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_is_deterministic_for_content_and_time() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("valid date");
        let a = MemoryId::derive("User prefers tea", &at);
        let b = MemoryId::derive("User prefers tea", &at);
        assert_eq!(a, b);
        assert_ne!(a, MemoryId::derive("User prefers coffee", &at));
    }

    #[test]
    fn salt_changes_id() {
        let at = Utc::now();
        assert_ne!(
            MemoryId::derive_salted("same", &at, 0),
            MemoryId::derive_salted("same", &at, 1)
        );
        assert_eq!(MemoryId::derive("same", &at), MemoryId::derive_salted("same", &at, 0));
    }

    #[test]
    fn legacy_hex_ids_round_trip_verbatim() {
        let id = MemoryId::parse("a1b2c3d4e5f6");
        assert_eq!(id, MemoryId::Legacy(0xa1b2_c3d4_e5f6));
        assert_eq!(id.to_string(), "a1b2c3d4e5f6");
        assert_eq!(serde_json::to_string(&id).expect("encode"), "\"a1b2c3d4e5f6\"");

        let leading_zero = MemoryId::parse("00000000beef");
        assert_eq!(leading_zero.to_string(), "00000000beef");
    }

    #[test]
    fn uuid_ids_round_trip() {
        let id = MemoryId::derive("tea", &Utc::now());
        let json = serde_json::to_string(&id).expect("encode");
        assert_eq!(serde_json::from_str::<MemoryId>(&json).expect("decode"), id);
    }

    #[test]
    fn other_strings_map_to_stable_ids() {
        let a = MemoryId::parse("memory-17");
        assert!(matches!(a, MemoryId::Uuid(_)));
        assert_eq!(a, MemoryId::parse("memory-17"));
        assert_ne!(a, MemoryId::parse("memory-18"));
        // Upper-case hex is not the legacy digest form.
        assert!(matches!(MemoryId::parse("A1B2C3D4E5F6"), MemoryId::Uuid(_)));
    }

    #[test]
    fn ids_work_as_json_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(MemoryId::parse("a1b2c3d4e5f6"), 3u32);
        let json = serde_json::to_string(&map).expect("encode");
        assert_eq!(json, r#"{"a1b2c3d4e5f6":3}"#);
        let back: BTreeMap<MemoryId, u32> = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, map);
    }

    #[test]
    fn naive_timestamps_read_as_utc() {
        let at = timestamp::parse("2025-03-01T12:00:00.123456").expect("naive");
        assert_eq!(at.to_rfc3339(), "2025-03-01T12:00:00.123456+00:00");
        let whole = timestamp::parse("2025-03-01T12:00:00").expect("no fraction");
        assert_eq!(whole, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("valid"));
        let offset = timestamp::parse("2025-03-01T14:00:00+02:00").expect("rfc3339");
        assert_eq!(offset, whole);
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn scores_order_numerically() {
        let mut scores =
            vec![RelevanceScore::new(0.2), RelevanceScore::new(0.9), RelevanceScore::ZERO];
        scores.sort();
        assert_eq!(scores[0], RelevanceScore::ZERO);
        assert!((scores[2].value() - 0.9).abs() < f64::EPSILON);
    }
}
