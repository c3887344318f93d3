//! Catalog service.
//!
//! Public product reads are cached with `moka` (5-minute TTL); every admin
//! write clears the cache. Checkout never reads through the cache so orders
//! are always priced from the stored documents.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tracing::{debug, info, instrument};

use restwell_core::{NewProduct, Product, ProductId};

use crate::db::{CategorySummary, ProductFilter, ProductRepository, RepositoryError};
use crate::error::{AppError, Result};

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: u64 = 1000;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(String),
    Products(ProductFilter),
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Arc<Vec<Product>>),
    Categories(Arc<Vec<CategorySummary>>),
}

/// Product reads and admin writes.
#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self { products, cache }
    }

    // =========================================================================
    // Storefront
    // =========================================================================

    /// Active products matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, filter: ProductFilter) -> Result<Arc<Vec<Product>>> {
        let filter = ProductFilter {
            include_inactive: false,
            ..filter
        };
        let key = CacheKey::Products(filter.clone());

        // Free-text searches are not cached
        if filter.search.is_none()
            && let Some(CacheValue::Products(products)) = self.cache.get(&key).await
        {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(self.products.list(&filter).await?);
        if filter.search.is_none() {
            self.cache
                .insert(key, CacheValue::Products(Arc::clone(&products)))
                .await;
        }
        Ok(products)
    }

    /// An active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no active product with that slug.
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<Product> {
        let key = CacheKey::Product(slug.to_owned());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = match self.products.get_by_slug(slug).await {
            Ok(product) if product.active => product,
            Ok(_) | Err(RepositoryError::NotFound) => {
                return Err(AppError::NotFound(format!("product {slug}")));
            }
            Err(e) => return Err(e.into()),
        };
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Categories with active products.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn categories(&self) -> Result<Arc<Vec<CategorySummary>>> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            return Ok(categories);
        }
        let categories = Arc::new(self.products.categories().await?);
        self.cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(Arc::clone(&categories)),
            )
            .await;
        Ok(categories)
    }

    /// Fresh product documents for pricing a checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn products_for_checkout(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        Ok(self.products.get_many(ids).await?)
    }

    // =========================================================================
    // Admin
    // =========================================================================

    /// All products, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn admin_list(&self, filter: ProductFilter) -> Result<Vec<Product>> {
        let filter = ProductFilter {
            include_inactive: true,
            ..filter
        };
        Ok(self.products.list(&filter).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist.
    pub async fn get(&self, id: ProductId) -> Result<Product> {
        Ok(self.products.get(id).await?)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `Conflict` if the slug is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct) -> Result<Product> {
        let product = input.into_product(Utc::now())?;
        self.products.insert(&product).await?;
        self.invalidate().await;
        info!(product_id = %product.id, slug = %product.slug, "Product created");
        Ok(product)
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error, `NotFound`, or `Conflict` if the slug is taken.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: ProductId, input: NewProduct) -> Result<Product> {
        input.validate()?;
        let mut product = self.products.get(id).await?;
        product.apply(input, Utc::now());
        self.products.update(&product).await?;
        self.invalidate().await;
        info!(slug = %product.slug, "Product updated");
        Ok(product)
    }

    /// Delete a product. Existing orders keep their line-item snapshots.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<()> {
        self.products.delete(id).await?;
        self.invalidate().await;
        info!("Product deleted");
        Ok(())
    }

    /// Total number of products, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn count(&self) -> Result<i64> {
        Ok(self.products.count().await?)
    }

    async fn invalidate(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}
