//! Record types for the lead pipeline
//!
//! - `Task` / `PendingDetail`: units of work flowing from search to extraction
//! - `FieldSet` / `PartialRecord`: per-strategy output and the priority merge
//! - `Record`: the final, immutable eight-field wire record

mod fields;
mod partial;
mod task;

pub use fields::{
    clean_text, compute_years_in_business, non_negative, normalize_email, normalize_phone,
    normalize_rating, normalize_website, parse_count, parse_rating, Field, FieldSet,
};
pub use partial::{FieldSource, PartialRecord, Tagged};
pub use task::{PendingDetail, Task, TaskQuery};

use serde::{Deserialize, Serialize};

/// A finished lead record
///
/// Every key is always serialized; absent values are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub business_name: String,
    pub years_in_business: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
}

impl Record {
    /// Creates a record with only the required field set
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            years_in_business: None,
            rating: None,
            review_count: None,
            industry: None,
            phone: None,
            website: None,
            email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keys_serialized_with_nulls() {
        let record = Record::new("Corner Deli");
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 8);
        for field in Field::ALL {
            assert!(obj.contains_key(field.key()), "missing {}", field.key());
        }
        assert!(obj["email"].is_null());
        assert_eq!(obj["business_name"], "Corner Deli");
    }

    #[test]
    fn test_serialized_values() {
        let record = Record {
            rating: Some(4.5),
            review_count: Some(12),
            ..Record::new("Shop")
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"rating\":4.5"));
        assert!(json.contains("\"review_count\":12"));
        assert!(json.contains("\"phone\":null"));
    }
}
