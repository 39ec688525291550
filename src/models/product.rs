use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Features a license for this product may grant
    pub features: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Product {
    /// Granted features the product doesn't offer.
    pub fn unknown_features<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|f| !self.features.contains(f))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}
