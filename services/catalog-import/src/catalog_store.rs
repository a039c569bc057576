use crate::config::DatabaseConfig;
use crate::model::{CatalogProduct, ProductRecord, StockRecord};
use crate::ports::CatalogStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO products (id, title, description, price, updated_at)
    VALUES ($1, $2, $3, $4, NOW())
    ON CONFLICT (id) DO UPDATE SET
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        price = EXCLUDED.price,
        updated_at = NOW()
"#;

const UPSERT_STOCK: &str = r#"
    INSERT INTO stocks (product_id, count, updated_at)
    VALUES ($1, $2, NOW())
    ON CONFLICT (product_id) DO UPDATE SET
        count = EXCLUDED.count,
        updated_at = NOW()
"#;

const SELECT_PRODUCTS: &str = r#"
    SELECT p.id, p.title, p.description, p.price, COALESCE(s.count, 0) AS count
    FROM products p
    LEFT JOIN stocks s ON s.product_id = p.id
"#;

/// Product catalog in PostgreSQL
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    /// Product and stock rows are written in one transaction
    #[instrument(skip(self, product, stock), fields(id = %product.id))]
    async fn upsert(&self, product: &ProductRecord, stock: &StockRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(UPSERT_PRODUCT)
            .bind(&product.id)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert product")?;

        sqlx::query(UPSERT_STOCK)
            .bind(&stock.product_id)
            .bind(stock.count)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert stock")?;

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(price = product.price, count = stock.count, "Product upserted");
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<CatalogProduct>> {
        let query = format!("{SELECT_PRODUCTS} ORDER BY p.title, p.id");
        sqlx::query_as::<_, CatalogProduct>(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list products")
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: &str) -> Result<Option<CatalogProduct>> {
        let query = format!("{SELECT_PRODUCTS} WHERE p.id = $1");
        sqlx::query_as::<_, CatalogProduct>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch product")
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}
