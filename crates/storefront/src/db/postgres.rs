//! `PostgreSQL` repositories.
//!
//! Queries are built at runtime (`sqlx::query_as` with `FromRow` rows) so the
//! crate compiles without a live database. Rows are converted into core
//! documents with every enum and validated newtype re-checked on the way out;
//! a value that no longer parses is reported as `DataCorruption`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use restwell_core::{
    Customer, CustomerDetails, CustomerId, Email, LineItem, Money, Order, OrderId, OrderStatus,
    OrderTotals, Payment, PaymentStatus, Phone, Product, ProductId, ShippingAddress, StatusChange,
};

use super::{
    CategorySummary, CustomerFilter, CustomerRepository, OrderFilter, OrderRepository, OrderStats,
    Page, ProductFilter, ProductRepository, RepositoryError, StatusCount,
};

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

fn money(what: &str, value: Decimal) -> Result<Money, RepositoryError> {
    Money::new(value).map_err(|e| corrupt(what, e))
}

/// Map unique-constraint violations to `Conflict`.
fn map_unique(err: sqlx::Error, message: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(message.to_owned())
        }
        _ => RepositoryError::Database(err),
    }
}

// =============================================================================
// Products
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, name, slug, description, category, price, compare_at_price, \
     images, sizes, in_stock, featured, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    slug: String,
    description: String,
    category: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    images: Json<Vec<String>>,
    sizes: Json<Vec<String>>,
    in_stock: bool,
    featured: bool,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            category: row.category,
            price: money("price", row.price)?,
            compare_at_price: row
                .compare_at_price
                .map(|p| money("compare_at_price", p))
                .transpose()?,
            images: row.images.0,
            sizes: row.sizes.0,
            in_stock: row.in_stock,
            featured: row.featured,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for catalog documents.
#[derive(Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));
        if !filter.include_inactive {
            query.push(" AND active");
        }
        if let Some(category) = &filter.category {
            query.push(" AND lower(category) = lower(").push_bind(category.clone()).push(")");
        }
        if let Some(featured) = filter.featured {
            query.push(" AND featured = ").push_bind(featured);
        }
        if let Some(term) = &filter.search {
            let pattern = format!("%{}%", escape_like(term));
            query
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY featured DESC, name ASC");

        let rows: Vec<ProductRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO products (id, name, slug, description, category, price, compare_at_price,
                                  images, sizes, in_stock, featured, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price.amount())
        .bind(product.compare_at_price.map(Money::amount))
        .bind(Json(&product.images))
        .bind(Json(&product.sizes))
        .bind(product.in_stock)
        .bind(product.featured)
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "a product with this slug already exists"))?;
        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET name = $2, slug = $3, description = $4, category = $5, price = $6,
                compare_at_price = $7, images = $8, sizes = $9, in_stock = $10,
                featured = $11, active = $12, updated_at = $13
            WHERE id = $1
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price.amount())
        .bind(product.compare_at_price.map(Money::amount))
        .bind(Json(&product.images))
        .bind(Json(&product.sizes))
        .bind(product.in_stock)
        .bind(product.featured)
        .bind(product.active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "a product with this slug already exists"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<CategorySummary>, RepositoryError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r"
            SELECT category, COUNT(*) AS product_count
            FROM products
            WHERE active
            GROUP BY category
            ORDER BY category
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, product_count)| CategorySummary {
                name,
                product_count,
            })
            .collect())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn escape_like(term: &str) -> String {
    term.trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "id, order_number, customer_name, customer_email, customer_phone, \
     items, shipping_address, subtotal, shipping, total, status, payment_status, payment_amount, \
     merchant_transaction_id, gateway_transaction_id, gateway_code, payment_updated_at, \
     status_history, notes, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    items: Json<Vec<LineItem>>,
    shipping_address: Json<ShippingAddress>,
    subtotal: Decimal,
    shipping: Decimal,
    total: Decimal,
    status: String,
    payment_status: String,
    payment_amount: Decimal,
    merchant_transaction_id: Option<String>,
    gateway_transaction_id: Option<String>,
    gateway_code: Option<String>,
    payment_updated_at: DateTime<Utc>,
    status_history: Json<Vec<StatusChange>>,
    notes: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(|e| corrupt("order status", e))?;
        let payment_status: PaymentStatus = row
            .payment_status
            .parse()
            .map_err(|e| corrupt("payment status", e))?;

        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            customer: CustomerDetails {
                name: row.customer_name,
                email: Email::parse(&row.customer_email).map_err(|e| corrupt("email", e))?,
                phone: Phone::parse(&row.customer_phone).map_err(|e| corrupt("phone", e))?,
            },
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            totals: OrderTotals {
                subtotal: money("subtotal", row.subtotal)?,
                shipping: money("shipping", row.shipping)?,
                total: money("total", row.total)?,
            },
            status,
            payment: Payment {
                status: payment_status,
                amount: money("payment amount", row.payment_amount)?,
                merchant_transaction_id: row.merchant_transaction_id,
                gateway_transaction_id: row.gateway_transaction_id,
                gateway_code: row.gateway_code,
                updated_at: row.payment_updated_at,
            },
            status_history: row.status_history.0,
            notes: row.notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for order documents.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: impl for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause}"))
                .bind(value)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }
}

fn push_order_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    query.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = filter.payment_status {
        query
            .push(" AND payment_status = ")
            .push_bind(payment_status.as_str());
    }
    if let Some(email) = &filter.email {
        query
            .push(" AND customer_email = ")
            .push_bind(email.trim().to_lowercase());
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO orders (id, order_number, customer_name, customer_email, customer_phone,
                                items, shipping_address, subtotal, shipping, total, status,
                                payment_status, payment_amount, merchant_transaction_id,
                                gateway_transaction_id, gateway_code, payment_updated_at,
                                status_history, notes, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22)
            ",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.customer.name)
        .bind(order.customer.email.as_str())
        .bind(order.customer.phone.as_str())
        .bind(Json(&order.items))
        .bind(Json(&order.shipping_address))
        .bind(order.totals.subtotal.amount())
        .bind(order.totals.shipping.amount())
        .bind(order.totals.total.amount())
        .bind(order.status.as_str())
        .bind(order.payment.status.as_str())
        .bind(order.payment.amount.amount())
        .bind(order.payment.merchant_transaction_id.as_deref())
        .bind(order.payment.gateway_transaction_id.as_deref())
        .bind(order.payment.gateway_code.as_deref())
        .bind(order.payment.updated_at)
        .bind(Json(&order.status_history))
        .bind(order.notes.as_deref())
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "order already exists"))?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        self.fetch_one_where("id = $1", id).await
    }

    async fn find_by_transaction(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Order, RepositoryError> {
        self.fetch_one_where("merchant_transaction_id = $1", merchant_transaction_id.to_owned())
            .await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError> {
        let mut count_query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM orders");
        push_order_filter(&mut count_query, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset);
        let rows: Vec<OrderRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(Order::try_from)
                .collect::<Result<_, _>>()?,
            total,
            limit: filter.page.limit,
            offset: filter.page.offset,
        })
    }

    async fn update(&self, order: &mut Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $3, payment_status = $4, merchant_transaction_id = $5,
                gateway_transaction_id = $6, gateway_code = $7, payment_updated_at = $8,
                status_history = $9, notes = $10, updated_at = $11, version = version + 1
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.payment.status.as_str())
        .bind(order.payment.merchant_transaction_id.as_deref())
        .bind(order.payment.gateway_transaction_id.as_deref())
        .bind(order.payment.gateway_code.as_deref())
        .bind(order.payment.updated_at)
        .bind(Json(&order.status_history))
        .bind(order.notes.as_deref())
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "merchant transaction id already in use"))?;

        if result.rows_affected() == 0 {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                    .bind(order.id)
                    .fetch_one(&self.pool)
                    .await?;
            return Err(if exists {
                RepositoryError::StaleVersion
            } else {
                RepositoryError::NotFound
            });
        }

        order.version += 1;
        Ok(())
    }

    async fn pending_payments(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE payment_status = 'PENDING'
              AND merchant_transaction_id IS NOT NULL
              AND payment_updated_at < $1
            ORDER BY created_at
            "
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;
        let by_status = rows
            .into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: status.parse().map_err(|e| corrupt("order status", e))?,
                    count,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let (awaiting_payment, revenue): (i64, Decimal) = sqlx::query_as(
            r"
            SELECT
                COUNT(*) FILTER (WHERE payment_status = 'PENDING' AND status <> 'CANCELLED'),
                COALESCE(SUM(total) FILTER (WHERE payment_status = 'COMPLETED'), 0)
            FROM orders
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats {
            total_orders: by_status.iter().map(|s| s.count).sum(),
            by_status,
            awaiting_payment,
            revenue: money("revenue", revenue)?,
        })
    }
}

// =============================================================================
// Customers
// =============================================================================

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, orders_count, total_spent, last_order_at, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: CustomerId,
    name: String,
    email: String,
    phone: String,
    orders_count: i32,
    total_spent: Decimal,
    last_order_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: Email::parse(&row.email).map_err(|e| corrupt("email", e))?,
            phone: Phone::parse(&row.phone).map_err(|e| corrupt("phone", e))?,
            orders_count: u32::try_from(row.orders_count)
                .map_err(|e| corrupt("orders_count", e))?,
            total_spent: money("total_spent", row.total_spent)?,
            last_order_at: row.last_order_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for customer documents.
#[derive(Clone)]
pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_customer_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &CustomerFilter) {
    if let Some(term) = &filter.search {
        let pattern = format!("%{}%", escape_like(term));
        query
            .push(" WHERE (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn record_order(&self, order: &Order) -> Result<Customer, RepositoryError> {
        let fresh = Customer::from_order(order);
        let row: CustomerRow = sqlx::query_as(&format!(
            r"
            INSERT INTO customers (id, name, email, phone, orders_count,
                                   last_order_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $5, $5)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                orders_count = customers.orders_count + 1,
                last_order_at = EXCLUDED.last_order_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {CUSTOMER_COLUMNS}
            "
        ))
        .bind(fresh.id)
        .bind(&fresh.name)
        .bind(fresh.email.as_str())
        .bind(fresh.phone.as_str())
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn record_payment(&self, email: &Email, amount: Money) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE customers
            SET total_spent = total_spent + $2, updated_at = NOW()
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .bind(amount.amount())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, id: CustomerId) -> Result<Customer, RepositoryError> {
        let row: Option<CustomerRow> =
            sqlx::query_as(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn list(&self, filter: &CustomerFilter) -> Result<Page<Customer>, RepositoryError> {
        let mut count_query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM customers");
        push_customer_filter(&mut count_query, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {CUSTOMER_COLUMNS} FROM customers"));
        push_customer_filter(&mut query, filter);
        query
            .push(" ORDER BY last_order_at DESC NULLS LAST LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset);
        let rows: Vec<CustomerRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(Customer::try_from)
                .collect::<Result<_, _>>()?,
            total,
            limit: filter.page.limit,
            offset: filter.page.offset,
        })
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
