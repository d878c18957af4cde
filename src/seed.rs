//! Built-in demo listings that are always part of the catalog view.
use chrono::Utc;
use once_cell::sync::Lazy;

use crate::model::{Category, ListingRecord};

static SEED: Lazy<Vec<ListingRecord>> = Lazy::new(|| build(Utc::now().timestamp_millis()));

/// The seed catalog. Built on first access and never mutated afterwards.
pub fn seed_catalog() -> &'static [ListingRecord] {
    &SEED
}

fn build(now_ms: i64) -> Vec<ListingRecord> {
    vec![
        ListingRecord {
            id: "seed-1".into(),
            owner_handle: "Marathoner_92".into(),
            owner_id: None,
            title: "Nike Air Zoom Alphafly NEXT% 2".into(),
            description: "Mileage only 15 km. Did not fit the last. Original. Size 43 EU.".into(),
            category: Category::Running,
            price: 18500,
            images: vec![
                "https://images.unsplash.com/photo-1606107557195-0e29a4b5b4aa?auto=format&fit=crop&q=80&w=800".into(),
            ],
            created_at: now_ms - 100_000,
            qa_note: Some("Q: For narrow feet?\nA: Yes, fits tight.".into()),
        },
        ListingRecord {
            id: "seed-2".into(),
            owner_handle: "Velo_Pro".into(),
            owner_id: None,
            title: "Giro Aether Helmet".into(),
            description: "Top helmet, size M. Like new condition.".into(),
            category: Category::Cycling,
            price: 12000,
            images: vec![
                "https://images.unsplash.com/photo-1596435308018-774f76269661?auto=format&fit=crop&q=80&w=800".into(),
            ],
            created_at: now_ms - 200_000,
            qa_note: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_stable_across_calls() {
        let a = seed_catalog();
        let b = seed_catalog();
        assert_eq!(a, b);
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn seed_records_are_well_formed() {
        let seed = seed_catalog();
        assert_eq!(seed.len(), 2);
        for rec in seed {
            assert!(rec.is_well_formed());
            assert!(!rec.images.is_empty());
            assert!(rec.owner_id.is_none());
        }
        assert!(seed[0].created_at > seed[1].created_at);
    }
}
