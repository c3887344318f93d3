//! Seed the catalog from a YAML file.
//!
//! Products are matched by slug: existing ones are updated in place, new ones
//! are inserted. Running the same file twice is a no-op apart from
//! `updated_at`.
//!
//! ```yaml
//! products:
//!   - name: Ortho Memory Foam Mattress
//!     category: mattresses
//!     price: "18999.00"
//!     sizes: [Single, Queen, King]
//!     featured: true
//! ```

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use restwell_core::NewProduct;
use restwell_storefront::db::{self, PgProductRepository, ProductRepository, RepositoryError};

use super::database_url;

#[derive(Debug, Deserialize)]
struct ProductsFile {
    products: Vec<NewProduct>,
}

/// Parse and validate a products file, collecting every problem.
fn load(content: &str) -> Result<Vec<NewProduct>, Box<dyn std::error::Error>> {
    let file: ProductsFile = serde_yaml::from_str(content)?;

    let mut errors = Vec::new();
    let mut slugs = std::collections::HashSet::new();
    for (index, product) in file.products.iter().enumerate() {
        if let Err(e) = product.validate() {
            errors.push(format!("product #{} ({}): {e}", index + 1, product.name));
        }
        if !slugs.insert(product.resolved_slug()) {
            errors.push(format!(
                "product #{} ({}): duplicate slug {}",
                index + 1,
                product.name,
                product.resolved_slug()
            ));
        }
    }

    if !errors.is_empty() {
        error!("Product file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }
    Ok(file.products)
}

/// Upsert products from `file_path`.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or a database
/// operation fails.
pub async fn products(file_path: &str, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading products from file");
    let content = tokio::fs::read_to_string(path).await?;
    let products = load(&content)?;
    info!(count = products.len(), "Product file validated");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let pool = db::create_pool(&database_url()?).await?;
    let repository = PgProductRepository::new(pool);

    let (mut created, mut updated) = (0_usize, 0_usize);
    for input in products {
        let now = Utc::now();
        match repository.get_by_slug(&input.resolved_slug()).await {
            Ok(mut existing) => {
                existing.apply(input, now);
                repository.update(&existing).await?;
                updated += 1;
            }
            Err(RepositoryError::NotFound) => {
                let product = input.into_product(now)?;
                repository.insert(&product).await?;
                created += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(created, updated, "Products seeded");
    Ok(())
}
