use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of listing categories.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub enum Category {
    #[default]
    Running,
    Cycling,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0:?}")]
pub struct UnknownCategory(pub String);

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Running => "Running",
            Category::Cycling => "Cycling",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// English names in any case, plus the legacy labels `Бег` and `ВЕЛО`.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("running") || label == "Бег" {
            Ok(Category::Running)
        } else if label.eq_ignore_ascii_case("cycling") || label.to_lowercase() == "вело" {
            Ok(Category::Cycling)
        } else {
            Err(UnknownCategory(label.to_string()))
        }
    }
}

impl TryFrom<String> for Category {
    type Error = UnknownCategory;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category half of a catalog query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl FromStr for CategoryFilter {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s == "Все" {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

/// A listing as it appears in the reconciled catalog view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRecord {
    pub id: String,
    #[serde(rename = "user")]
    pub owner_handle: String,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: u64,
    pub images: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "qna", skip_serializing_if = "Option::is_none")]
    pub qa_note: Option<String>,
}

/// Lenient wire shape of a remote record: every field may be absent or null.
#[derive(Debug, Default, Deserialize)]
struct RawListing {
    id: Option<String>,
    user: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    price: Option<u64>,
    images: Option<Vec<String>>,
    #[serde(rename = "createdAt")]
    created_at: Option<i64>,
    qna: Option<String>,
}

impl ListingRecord {
    /// Decode one raw remote record. Returns `None` for malformed input:
    /// undecodable field types, a missing/blank `id` or `title`, or a
    /// category label outside the known set. A missing category is `Running`.
    pub fn from_raw(raw: &Value) -> Option<ListingRecord> {
        let raw: RawListing = RawListing::deserialize(raw).ok()?;
        let id = raw.id.filter(|s| !s.trim().is_empty())?;
        let title = raw.title.filter(|s| !s.trim().is_empty())?;
        let category = match raw.category {
            Some(label) => label.parse().ok()?,
            None => Category::default(),
        };
        Some(ListingRecord {
            id,
            owner_handle: raw.user.unwrap_or_default(),
            owner_id: raw.user_id.filter(|s| !s.is_empty()),
            title,
            description: raw.description.unwrap_or_default(),
            category,
            price: raw.price.unwrap_or(0),
            images: raw.images.unwrap_or_default(),
            created_at: raw.created_at.unwrap_or(0),
            qa_note: raw.qna.filter(|s| !s.is_empty()),
        })
    }

    /// Typed records can still carry blank identifiers when built in code.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// A finished listing on its way to the write path; the store assigns `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewListing {
    #[serde(rename = "userId")]
    pub owner_id: String,
    #[serde(rename = "user")]
    pub owner_handle: String,
    pub title: String,
    pub category: Category,
    pub price: u64,
    pub images: Vec<String>,
    pub description: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "qna")]
    pub qa_note: String,
}

impl NewListing {
    pub fn into_record(self, id: String) -> ListingRecord {
        ListingRecord {
            id,
            owner_handle: self.owner_handle,
            owner_id: Some(self.owner_id),
            title: self.title,
            description: self.description,
            category: self.category,
            price: self.price,
            images: self.images,
            created_at: self.created_at,
            qa_note: Some(self.qa_note).filter(|s| !s.is_empty()),
        }
    }
}

/// Authenticated identity handed to the core by the sign-in layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Public display name: "Athlete #" plus the last four characters of the id.
    pub fn owner_handle(&self) -> String {
        let chars: Vec<char> = self.user_id.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("Athlete #{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_accepts_legacy_labels() {
        assert_eq!("Бег".parse::<Category>().unwrap(), Category::Running);
        assert_eq!("ВЕЛО".parse::<Category>().unwrap(), Category::Cycling);
        assert_eq!("running".parse::<Category>().unwrap(), Category::Running);
        assert_eq!(
            "Swimming".parse::<Category>(),
            Err(UnknownCategory("Swimming".into()))
        );
    }

    #[test]
    fn category_filter_rejects_unknown_labels() {
        assert!("Tennis".parse::<CategoryFilter>().is_err());
        assert!("".parse::<CategoryFilter>().is_err());
    }

    #[test]
    fn from_raw_drops_unknown_category() {
        let swimming = json!({ "id": "s", "title": "Goggles", "category": "Swimming" });
        assert!(ListingRecord::from_raw(&swimming).is_none());

        let missing = ListingRecord::from_raw(&json!({ "id": "m", "title": "Cap" })).unwrap();
        assert_eq!(missing.category, Category::Running);
    }

    #[test]
    fn typed_record_rejects_unknown_category() {
        let raw = json!({
            "id": "x", "user": "", "title": "t", "description": "",
            "category": "Swimming", "price": 1, "images": [], "createdAt": 0
        });
        assert!(serde_json::from_value::<ListingRecord>(raw).is_err());
    }

    #[test]
    fn category_filter_parses_all() {
        assert_eq!("All".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!("Все".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!(
            "Cycling".parse::<CategoryFilter>().unwrap(),
            CategoryFilter::Only(Category::Cycling)
        );
    }

    #[test]
    fn from_raw_decodes_wire_names() {
        let raw = json!({
            "id": "abc",
            "user": "Athlete #1234",
            "userId": "uid-1234",
            "title": "Garmin 955",
            "category": "Бег",
            "price": 30000,
            "images": ["https://img/1.jpg"],
            "createdAt": 1_700_000_000_000i64,
            "qna": ""
        });
        let rec = ListingRecord::from_raw(&raw).unwrap();
        assert_eq!(rec.owner_handle, "Athlete #1234");
        assert_eq!(rec.owner_id.as_deref(), Some("uid-1234"));
        assert_eq!(rec.category, Category::Running);
        assert_eq!(rec.created_at, 1_700_000_000_000);
        assert_eq!(rec.description, "");
        assert!(rec.qa_note.is_none());
    }

    #[test]
    fn from_raw_rejects_malformed() {
        assert!(ListingRecord::from_raw(&json!({ "title": "no id" })).is_none());
        assert!(ListingRecord::from_raw(&json!({ "id": "x" })).is_none());
        assert!(ListingRecord::from_raw(&json!({ "id": "x", "title": "  " })).is_none());
        assert!(ListingRecord::from_raw(&json!({ "id": "x", "title": "t", "price": "cheap" })).is_none());
        assert!(ListingRecord::from_raw(&json!("just a string")).is_none());
    }

    #[test]
    fn from_raw_defaults_missing_created_at_to_zero() {
        let rec = ListingRecord::from_raw(&json!({ "id": "x", "title": "t", "createdAt": null })).unwrap();
        assert_eq!(rec.created_at, 0);
    }

    #[test]
    fn owner_handle_uses_last_four_chars() {
        assert_eq!(Session::new("abcdef123").owner_handle(), "Athlete #f123");
        assert_eq!(Session::new("ab").owner_handle(), "Athlete #ab");
    }

    #[test]
    fn new_listing_serializes_wire_names() {
        let listing = NewListing {
            owner_id: "uid".into(),
            owner_handle: "Athlete #uid".into(),
            title: "Helmet".into(),
            category: Category::Cycling,
            price: 100,
            images: vec!["blob:1".into()],
            description: String::new(),
            created_at: 5,
            qa_note: String::new(),
        };
        let v = serde_json::to_value(&listing).unwrap();
        assert_eq!(v["userId"], "uid");
        assert_eq!(v["category"], "Cycling");
        assert_eq!(v["createdAt"], 5);
        assert_eq!(v["qna"], "");
        assert!(v.get("id").is_none());
    }
}
