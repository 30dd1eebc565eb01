//! # Redis Store
//!
//! `SessionStore` over a Redis instance. The connection manager reconnects
//! on its own; individual command failures surface as `StoreUnavailable`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::domain::traits::SessionStore;
use crate::domain::types::Failure;

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting to redis at {url}");
        let client = redis::Client::open(url).context("Invalid redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to connect to redis")?;
        Ok(Self { conn })
    }
}

fn store_error(e: redis::RedisError) -> Failure {
    Failure::StoreUnavailable(e.to_string())
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Failure> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Failure> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs())
                .await
                .map_err(store_error),
            None => conn.set(key, value).await.map_err(store_error),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), Failure> {
        let mut conn = self.conn.clone();
        conn.del(key).await.map_err(store_error)
    }
}
