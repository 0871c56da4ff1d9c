//! Canonical DNS rewrite records
//!
//! Every record has a canonical string form which doubles as the cache and
//! dedup key:
//!
//! - A: `"{value} {domain}"`, e.g. `"1.2.3.4 nas.home"`
//! - CNAME: `"{domain} -> {value}"`, e.g. `"www.home -> nas.home"`
//!
//! Domains and values never carry a trailing dot, so parsing and formatting a
//! canonical string is lossless.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const CNAME_SEPARATOR: &str = " -> ";

static EMPTY: BTreeSet<String> = BTreeSet::new();

/// DNS record type handled by the reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Address record (`ip domain`)
    A,
    /// Alias record (`domain -> target`)
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    /// Every type the engine diffs, in apply order
    pub const ALL: [RecordType; 2] = [RecordType::A, RecordType::Cname];

    /// Wire/display name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "CNAME" => Ok(RecordType::Cname),
            other => Err(Error::invalid_record(format!(
                "Unsupported record type: {}",
                other
            ))),
        }
    }
}

/// A single DNS rewrite / host-override entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Name being rewritten, without trailing dot
    pub domain: String,
    /// IP address for A records, target name for CNAME records
    pub value: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Optional TTL (not part of the canonical form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl DnsRecord {
    /// Create a record, normalizing trailing dots away
    pub fn new(
        record_type: RecordType,
        domain: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Self {
        Self {
            domain: normalize(domain.as_ref()),
            value: normalize(value.as_ref()),
            record_type,
            ttl: None,
        }
    }

    /// Create an A record
    pub fn a(ip: impl AsRef<str>, domain: impl AsRef<str>) -> Self {
        Self::new(RecordType::A, domain, ip)
    }

    /// Create a CNAME record
    pub fn cname(domain: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        Self::new(RecordType::Cname, domain, target)
    }

    /// Attach a TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Canonical string form (the cache/dedup key)
    pub fn canonical(&self) -> String {
        match self.record_type {
            RecordType::A => format!("{} {}", self.value, self.domain),
            RecordType::Cname => format!("{}{}{}", self.domain, CNAME_SEPARATOR, self.value),
        }
    }

    /// Parse a canonical string of the given type
    pub fn parse(record_type: RecordType, canonical: &str) -> Result<Self> {
        let (domain, value) = match record_type {
            RecordType::A => {
                let (ip, domain) = canonical.split_once(' ').ok_or_else(|| {
                    Error::invalid_record(format!("A record missing separator: {:?}", canonical))
                })?;
                (domain, ip)
            }
            RecordType::Cname => canonical.split_once(CNAME_SEPARATOR).ok_or_else(|| {
                Error::invalid_record(format!(
                    "CNAME record missing '{}': {:?}",
                    CNAME_SEPARATOR.trim(),
                    canonical
                ))
            })?,
        };

        let record = Self::new(record_type, domain.trim(), value.trim());
        if record.domain.is_empty() || record.value.is_empty() {
            return Err(Error::invalid_record(format!(
                "{} record has an empty field: {:?}",
                record_type, canonical
            )));
        }
        Ok(record)
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.record_type, self.canonical())
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

/// A record set keyed by type; each entry is a canonical string
///
/// Set semantics give uniqueness. Iteration order is deterministic but no
/// caller may depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: BTreeMap<RecordType, BTreeSet<String>>,
}

impl RecordSet {
    /// Create an empty record set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record (stored as its canonical string)
    pub fn insert(&mut self, record: &DnsRecord) -> bool {
        self.records
            .entry(record.record_type)
            .or_default()
            .insert(record.canonical())
    }

    /// Insert a canonical string after validating it parses
    pub fn insert_canonical(&mut self, record_type: RecordType, canonical: &str) -> Result<bool> {
        let record = DnsRecord::parse(record_type, canonical)?;
        Ok(self.insert(&record))
    }

    /// Canonical strings of one type
    pub fn of_type(&self, record_type: RecordType) -> &BTreeSet<String> {
        self.records.get(&record_type).unwrap_or(&EMPTY)
    }

    /// Number of records of one type
    pub fn count(&self, record_type: RecordType) -> usize {
        self.of_type(record_type).len()
    }

    /// Per-type counts, omitting empty types
    pub fn counts(&self) -> BTreeMap<RecordType, usize> {
        self.records
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(ty, set)| (*ty, set.len()))
            .collect()
    }

    /// Total records across all types
    pub fn len(&self) -> usize {
        self.records.values().map(BTreeSet::len).sum()
    }

    /// Whether no records of any type are present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the canonical string is present for that type
    pub fn contains(&self, record_type: RecordType, canonical: &str) -> bool {
        self.of_type(record_type).contains(canonical)
    }

    /// Iterate `(type, canonical)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (RecordType, &str)> {
        self.records
            .iter()
            .flat_map(|(ty, set)| set.iter().map(move |s| (*ty, s.as_str())))
    }
}

impl FromIterator<DnsRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = DnsRecord>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.insert(&record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_round_trip() {
        let s = "1.2.3.4 nas.home";
        let record = DnsRecord::parse(RecordType::A, s).unwrap();
        assert_eq!(record.value, "1.2.3.4");
        assert_eq!(record.domain, "nas.home");
        assert_eq!(record.canonical(), s);
    }

    #[test]
    fn cname_record_round_trip() {
        let s = "www.home -> nas.home";
        let record = DnsRecord::parse(RecordType::Cname, s).unwrap();
        assert_eq!(record.domain, "www.home");
        assert_eq!(record.value, "nas.home");
        assert_eq!(record.canonical(), s);
    }

    #[test]
    fn trailing_dots_are_stripped() {
        let record = DnsRecord::cname("www.home.", "nas.home.");
        assert_eq!(record.canonical(), "www.home -> nas.home");

        let parsed = DnsRecord::parse(RecordType::A, "10.0.0.1 pi.home.").unwrap();
        assert_eq!(parsed.domain, "pi.home");
    }

    #[test]
    fn malformed_strings_are_rejected() {
        assert!(DnsRecord::parse(RecordType::A, "1.2.3.4").is_err());
        assert!(DnsRecord::parse(RecordType::A, " nas.home").is_err());
        assert!(DnsRecord::parse(RecordType::Cname, "www.home nas.home").is_err());
        assert!(DnsRecord::parse(RecordType::Cname, "www.home -> ").is_err());
    }

    #[test]
    fn record_type_parsing() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("CNAME".parse::<RecordType>().unwrap(), RecordType::Cname);
        assert!("TXT".parse::<RecordType>().is_err());
    }

    #[test]
    fn record_set_deduplicates_and_counts() {
        let mut set = RecordSet::new();
        assert!(set.insert(&DnsRecord::a("1.2.3.4", "nas.home")));
        assert!(!set.insert(&DnsRecord::a("1.2.3.4", "nas.home.")));
        set.insert(&DnsRecord::cname("www.home", "nas.home"));

        assert_eq!(set.len(), 2);
        assert_eq!(set.count(RecordType::A), 1);
        assert_eq!(set.count(RecordType::Cname), 1);
        assert!(set.contains(RecordType::A, "1.2.3.4 nas.home"));
        assert!(set.of_type(RecordType::Cname).contains("www.home -> nas.home"));
    }

    #[test]
    fn record_set_serializes_by_type_name() {
        let set: RecordSet = vec![
            DnsRecord::a("1.2.3.4", "nas.home"),
            DnsRecord::cname("www.home", "nas.home"),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["A"][0], "1.2.3.4 nas.home");
        assert_eq!(json["CNAME"][0], "www.home -> nas.home");

        let back: RecordSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
