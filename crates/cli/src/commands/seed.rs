//! Seed the product catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - id: banana
//!     name: Bananas
//!     unit_label: per bunch
//!     price: "2.49"
//!   - id: oat-milk
//!     name: Oat Milk
//!     price: "3.99"
//! ```
//!
//! Existing products are updated in place, so seeding is repeatable.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use grocer_core::{CartProduct, CurrencyCode, Price, ProductId};
use grocer_storefront::config::StorefrontConfig;
use grocer_storefront::db::{self, ProductRepository, RepositoryError};

use super::{CommandError, require_database_url};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0} invalid products in catalog file")]
    Invalid(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Catalog file contents.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<SeedProduct>,
}

/// One catalog entry.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unit_label: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: CurrencyCode,
}

impl TryFrom<SeedProduct> for CartProduct {
    type Error = String;

    fn try_from(entry: SeedProduct) -> Result<Self, Self::Error> {
        let product_id = ProductId::parse(&entry.id).map_err(|e| format!("{:?}: {e}", entry.id))?;
        let unit_price =
            Price::new(entry.price, entry.currency).map_err(|e| format!("{product_id}: {e}"))?;
        Ok(Self {
            product_id,
            name: entry.name,
            unit_label: entry.unit_label,
            image_ref: entry.image_ref,
            unit_price,
        })
    }
}

/// Parse and validate a catalog file, reporting every invalid entry.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any entry is invalid.
pub fn parse_catalog(content: &str) -> Result<Vec<CartProduct>, SeedError> {
    let file: CatalogFile = serde_yaml::from_str(content)?;

    let mut products = Vec::with_capacity(file.products.len());
    let mut invalid = 0;
    for entry in file.products {
        match CartProduct::try_from(entry) {
            Ok(product) => products.push(product),
            Err(e) => {
                error!("  - invalid product {e}");
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(SeedError::Invalid(invalid));
    }
    Ok(products)
}

/// Load products from `file_path` into the catalog.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or if a database
/// operation fails.
pub async fn products(config: &StorefrontConfig, file_path: &Path) -> Result<(), SeedError> {
    info!(path = %file_path.display(), "Loading catalog from file");
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|source| SeedError::Read {
            path: file_path.display().to_string(),
            source,
        })?;

    // Validate before connecting to the database
    let products = parse_catalog(&content)?;
    info!(products = products.len(), "Catalog validated");

    let pool = db::create_pool(require_database_url(config)?).await?;
    let repo = ProductRepository::new(&pool);
    for product in &products {
        repo.upsert(product).await?;
    }

    info!("Seeding complete!");
    info!("  Products upserted: {}", products.len());
    info!("  Catalog size: {}", repo.count().await?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let products = parse_catalog(
            r#"
products:
  - id: banana
    name: Bananas
    unit_label: per bunch
    price: "2.49"
  - id: oat-milk
    name: Oat Milk
    price: "3.99"
    currency: EUR
"#,
        )
        .unwrap();

        assert_eq!(products.len(), 2);
        let banana = products.first().unwrap();
        assert_eq!(banana.product_id.as_str(), "banana");
        assert_eq!(banana.unit_label.as_deref(), Some("per bunch"));
        assert_eq!(banana.unit_price.amount(), Decimal::new(249, 2));
        assert_eq!(
            products.get(1).unwrap().unit_price.currency_code(),
            CurrencyCode::EUR
        );
    }

    #[test]
    fn test_parse_catalog_rejects_invalid_entries() {
        let result = parse_catalog(
            r#"
products:
  - id: "  "
    name: Blank
    price: "1.00"
  - id: refund
    name: Negative
    price: "-1.00"
"#,
        );
        assert!(matches!(result, Err(SeedError::Invalid(2))));
    }
}
