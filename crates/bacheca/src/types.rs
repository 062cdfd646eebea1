use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A single listed activity/service/course record
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Initiative {
    /// Record id (UUID for staff-created records, derived for imports)
    pub id: String,

    /// Deduplication key for imported records, absent for staff-created ones
    #[serde(default)]
    pub source_id: Option<String>,

    /// Initiative title
    pub title: String,

    /// Organization running the initiative
    #[serde(default)]
    pub organization: String,

    /// Where it takes place
    #[serde(default)]
    pub location: String,

    /// Kind of initiative (e.g. "corso", "laboratorio", "sportello")
    #[serde(rename = "type", default)]
    pub category: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Free-form date text as entered by a human. No enforced format;
    /// interpreted best-effort by the `dates` module.
    #[serde(default)]
    pub date: String,

    /// Optional ISO 8601 expiry timestamp, independent of `date`
    #[serde(default)]
    pub end_date: Option<String>,

    /// RFC 3339 creation timestamp
    pub created_at: String,

    /// RFC 3339 last-update timestamp
    pub updated_at: String,
}

impl Initiative {
    /// Create a new staff-entered initiative with a fresh UUID
    pub fn new(
        title: String,
        organization: String,
        location: String,
        category: String,
        description: String,
        date: String,
        end_date: Option<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: None,
            title,
            organization,
            location,
            category,
            description,
            date,
            end_date,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Generate a stable dedup key from record content.
    /// Two records are the same listing if title, organization and date text
    /// all match, regardless of which import batch they arrived in.
    pub fn generate_source_id(title: &str, organization: &str, date: &str) -> String {
        use std::collections::hash_map::DefaultHasher;

        let mut hasher = DefaultHasher::new();
        title.hash(&mut hasher);
        organization.hash(&mut hasher);
        date.hash(&mut hasher);
        format!("src_{:016x}", hasher.finish())
    }

    /// Deduplication key for merging import batches
    pub fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.title, self.organization, self.date)
    }

    /// Whether this record has passed its expiry timestamp.
    /// Records without an `end_date`, or with one that does not parse as
    /// RFC 3339, never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.end_date {
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|end| end.with_timezone(&Utc) < now)
                .unwrap_or(false),
            None => false,
        }
    }
}

impl Hash for Initiative {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.organization.hash(state);
        self.date.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_initiative(title: &str, organization: &str, date: &str) -> Initiative {
        Initiative::new(
            title.to_string(),
            organization.to_string(),
            "Genova".to_string(),
            "corso".to_string(),
            String::new(),
            date.to_string(),
            None,
        )
    }

    #[test]
    fn test_new_sets_uuid_and_timestamps() {
        let initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");

        assert_eq!(initiative.id.len(), 36);
        assert!(initiative.source_id.is_none());
        assert_eq!(initiative.created_at, initiative.updated_at);
    }

    #[test]
    fn test_new_generates_distinct_ids() {
        let a = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        let b = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_dedup_key_format() {
        let initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        assert_eq!(initiative.dedup_key(), "Doposcuola|CPIA|Settembre 2024");
    }

    #[test]
    fn test_source_id_deterministic() {
        let a = Initiative::generate_source_id("Doposcuola", "CPIA", "Settembre 2024");
        let b = Initiative::generate_source_id("Doposcuola", "CPIA", "Settembre 2024");
        assert_eq!(a, b);
        assert!(a.starts_with("src_"));
    }

    #[test]
    fn test_source_id_differs_on_content() {
        let a = Initiative::generate_source_id("Doposcuola", "CPIA", "Settembre 2024");
        let b = Initiative::generate_source_id("Doposcuola", "CPIA", "Ottobre 2024");
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_expired_past_end_date() {
        let mut initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2023");
        initiative.end_date = Some("2023-12-31T23:59:59+01:00".to_string());

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(initiative.is_expired(now));
    }

    #[test]
    fn test_is_expired_future_end_date() {
        let mut initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        initiative.end_date = Some("2099-01-01T00:00:00+01:00".to_string());

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!initiative.is_expired(now));
    }

    #[test]
    fn test_is_expired_without_end_date() {
        let initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!initiative.is_expired(now));
    }

    #[test]
    fn test_is_expired_malformed_end_date() {
        let mut initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        initiative.end_date = Some("fine anno".to_string());

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!initiative.is_expired(now));
    }

    #[test]
    fn test_serialization_renames_category() {
        let initiative = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        let json = serde_json::to_string(&initiative).unwrap();
        assert!(json.contains("\"type\":\"corso\""));
        assert!(!json.contains("\"category\""));
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = r#"{
            "id": "abc",
            "title": "Laboratorio di lettura",
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let initiative: Initiative = serde_json::from_str(json).unwrap();

        assert_eq!(initiative.title, "Laboratorio di lettura");
        assert!(initiative.organization.is_empty());
        assert!(initiative.date.is_empty());
        assert!(initiative.end_date.is_none());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut original = make_initiative("Doposcuola", "CPIA", "Giugno 2023 - Settembre 2023");
        original.description = "Sostegno allo studio con caratteri speciali: àèìòù".to_string();

        let json = serde_json::to_string(&original).unwrap();
        let deserialized: Initiative = serde_json::from_str(&json).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_hash_covers_title_organization_date_only() {
        use std::collections::hash_map::DefaultHasher;

        fn calc_hash<T: Hash>(t: &T) -> u64 {
            let mut s = DefaultHasher::new();
            t.hash(&mut s);
            s.finish()
        }

        let a = make_initiative("Doposcuola", "CPIA", "Settembre 2024");
        let mut b = a.clone();
        b.description = "different".to_string();
        b.location = "Sestri Ponente".to_string();

        assert_eq!(calc_hash(&a), calc_hash(&b));
    }
}
