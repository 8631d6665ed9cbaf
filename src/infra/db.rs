use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::video::Video;

/// Persistence for video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get_video(&self, id: Uuid) -> Result<Option<Video>>;

    /// Writes the mutable fields of `video` back and returns the stored row.
    async fn update_video(&self, video: &Video) -> Result<Video>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl VideoStore for Db {
    async fn get_video(&self, id: Uuid) -> Result<Option<Video>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, description, video_url, created_at, updated_at \
             FROM videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| video_from_row(&row)))
    }

    async fn update_video(&self, video: &Video) -> Result<Video> {
        let row = sqlx::query(
            "UPDATE videos \
             SET title = $2, description = $3, video_url = $4, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, user_id, title, description, video_url, created_at, updated_at",
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.video_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(video_from_row(&row))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn video_from_row(row: &PgRow) -> Video {
    Video {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        description: row.get("description"),
        video_url: row.get("video_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
