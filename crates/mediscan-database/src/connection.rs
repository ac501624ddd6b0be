//! 数据库连接管理

use mediscan_core::{utils::mask_secret, MediscanError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// 数据库连接池
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        tracing::info!("Connecting to database: {}", mask_secret(url));

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| MediscanError::Database(format!("Database connection error: {}", e)))?;

        tracing::info!("Database connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
