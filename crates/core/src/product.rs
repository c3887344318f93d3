//! Catalog product documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId};

/// Validation errors for product input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    #[error("product name cannot be empty")]
    EmptyName,
    #[error("slug may only contain lowercase letters, digits and dashes: {0}")]
    InvalidSlug(String),
    #[error("price must be greater than zero")]
    ZeroPrice,
    #[error("compare-at price must be greater than the price")]
    CompareAtTooLow,
    #[error("category cannot be empty")]
    EmptyCategory,
}

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// URL handle, unique across the catalog.
    pub slug: String,
    pub description: String,
    pub category: String,
    pub price: Money,
    /// Original price shown struck through when the product is discounted.
    pub compare_at_price: Option<Money>,
    pub images: Vec<String>,
    /// Available sizes (e.g. "Single 72x36", "Queen 78x60").
    pub sizes: Vec<String>,
    pub in_stock: bool,
    pub featured: bool,
    /// Inactive products are hidden from the storefront but kept for order history.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can be added to a new order.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.active && self.in_stock
    }

    /// Overwrite the editable fields from admin input, keeping identity and
    /// creation time.
    pub fn apply(&mut self, input: NewProduct, now: DateTime<Utc>) {
        let slug = input.resolved_slug();
        self.name = input.name.trim().to_owned();
        self.slug = slug;
        self.description = input.description;
        self.category = input.category.trim().to_owned();
        self.price = input.price;
        self.compare_at_price = input.compare_at_price;
        self.images = input.images;
        self.sizes = input.sizes;
        self.in_stock = input.in_stock;
        self.featured = input.featured;
        self.active = input.active;
        self.updated_at = now;
    }
}

/// Admin input for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    /// Derived from the name when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: Money,
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

const fn default_true() -> bool {
    true
}

impl NewProduct {
    /// Validate the input.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProductError`] found.
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::EmptyName);
        }
        if self.category.trim().is_empty() {
            return Err(ProductError::EmptyCategory);
        }
        let slug = self.resolved_slug();
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ProductError::InvalidSlug(slug));
        }
        if self.price.is_zero() {
            return Err(ProductError::ZeroPrice);
        }
        if let Some(compare_at) = self.compare_at_price
            && compare_at <= self.price
        {
            return Err(ProductError::CompareAtTooLow);
        }
        Ok(())
    }

    /// The explicit slug, or one derived from the name.
    #[must_use]
    pub fn resolved_slug(&self) -> String {
        self.slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| slugify(&self.name), ToOwned::to_owned)
    }

    /// Build a new catalog document.
    ///
    /// # Errors
    ///
    /// Returns a [`ProductError`] if the input is invalid.
    pub fn into_product(self, now: DateTime<Utc>) -> Result<Product, ProductError> {
        self.validate()?;
        let mut product = Product {
            id: ProductId::new(),
            name: String::new(),
            slug: String::new(),
            description: String::new(),
            category: String::new(),
            price: self.price,
            compare_at_price: None,
            images: Vec::new(),
            sizes: Vec::new(),
            in_stock: true,
            featured: false,
            active: true,
            created_at: now,
            updated_at: now,
        };
        product.apply(self, now);
        Ok(product)
    }
}

/// Lowercase, dash-separated handle from a display name.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
