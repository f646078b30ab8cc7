use serde::{Deserialize, Serialize};

/// A product record in the catalog table
///
/// `product_id` is the partition key; all other fields are plain attributes
/// with no derived state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Product {
    pub product_id: String,
    pub product_title: String,
    pub product_category: String,
}

impl Product {
    pub fn new(
        product_id: impl Into<String>,
        product_title: impl Into<String>,
        product_category: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_title: product_title.into(),
            product_category: product_category.into(),
        }
    }
}
