//! SQLite database for subscriptions and notification channels.

use async_trait::async_trait;
use bondwatch_core::{
    Brand, ChannelKind, NewChannel, NotificationChannel, StoreError, Subscription,
    SubscriptionStore, ChannelStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

type SubscriptionRow = (i64, String, f64, i64, bool, Option<f64>, Option<i64>, String);
type ChannelRow = (i64, i64, String, Option<String>, bool, Option<String>, Option<i64>);

const SUBSCRIPTION_COLUMNS: &str =
    "id, bond_address, threshold, check_interval_secs, is_active, last_balance, last_checked, brand";
const CHANNEL_COLUMNS: &str =
    "id, subscription_id, channel_kind, destination, is_verified, verification_code, verification_expires";

/// Database connection for bondwatch.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given path.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::info!(url = database_url, "Database ready");
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bond_address TEXT NOT NULL UNIQUE,
                threshold REAL NOT NULL,
                check_interval_secs INTEGER NOT NULL DEFAULT 900,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_balance REAL,
                last_checked INTEGER,
                brand TEXT NOT NULL DEFAULT 'jpool',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscription_id INTEGER NOT NULL REFERENCES subscriptions(id),
                channel_kind TEXT NOT NULL,
                destination TEXT,
                is_verified INTEGER NOT NULL DEFAULT 0,
                verification_code TEXT,
                verification_expires INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(subscription_id, channel_kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_channels_by_subscription
            ON notification_channels(subscription_id, is_verified)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn map_subscription(row: SubscriptionRow) -> Subscription {
    let (id, address, threshold, check_interval_secs, active, last_balance, last_checked, brand) =
        row;
    Subscription {
        id,
        address,
        threshold,
        check_interval_secs,
        last_balance,
        last_checked,
        active,
        brand: Brand::parse_or_default(&brand),
    }
}

fn map_channel(row: ChannelRow) -> NotificationChannel {
    let (id, subscription_id, kind, destination, verified, verification_code, verification_expires) =
        row;
    NotificationChannel {
        id,
        subscription_id,
        // Unknown kinds cannot appear: writes go through ChannelKind.
        kind: ChannelKind::parse(&kind).unwrap_or(ChannelKind::Email),
        destination,
        verified,
        verification_code,
        verification_expires,
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(dbe) if dbe.is_unique_violation()
    )
}

#[async_trait]
impl SubscriptionStore for Database {
    async fn upsert_subscription(
        &self,
        address: &str,
        threshold: f64,
        check_interval_secs: i64,
        brand: Brand,
    ) -> Result<Subscription, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (bond_address, threshold, check_interval_secs, brand)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(bond_address)
            DO UPDATE SET threshold = ?, check_interval_secs = ?, brand = ?, is_active = 1
            "#,
        )
        .bind(address)
        .bind(threshold)
        .bind(check_interval_secs)
        .bind(brand.as_str())
        .bind(threshold)
        .bind(check_interval_secs)
        .bind(brand.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.find_by_address(address)
            .await?
            .ok_or_else(|| StoreError::Database("upsert produced no row".to_string()))
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(map_subscription))
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE bond_address = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(map_subscription))
    }

    async fn find_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE is_active = 1 ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(map_subscription).collect())
    }

    async fn record_balance_check(
        &self,
        id: i64,
        balance: f64,
        checked_at: i64,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE subscriptions SET last_balance = ?, last_checked = ? WHERE id = ?")
                .bind(balance)
                .bind(checked_at)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubscriptionNotFound(id));
        }
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubscriptionNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for Database {
    async fn create_channel(&self, new: NewChannel) -> Result<NotificationChannel, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_channels
                (subscription_id, channel_kind, destination, is_verified, verification_code, verification_expires)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.subscription_id)
        .bind(new.kind.as_str())
        .bind(&new.destination)
        .bind(new.verified)
        .bind(&new.verification_code)
        .bind(new.verification_expires)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateChannel {
                    subscription_id: new.subscription_id,
                    kind: new.kind,
                }
            } else {
                store_err(e)
            }
        })?;

        Ok(NotificationChannel {
            id: result.last_insert_rowid(),
            subscription_id: new.subscription_id,
            kind: new.kind,
            destination: new.destination,
            verified: new.verified,
            verification_code: new.verification_code,
            verification_expires: new.verification_expires,
        })
    }

    async fn find_channel(&self, id: i64) -> Result<Option<NotificationChannel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {} FROM notification_channels WHERE id = ?",
            CHANNEL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(map_channel))
    }

    async fn find_by_subscription(
        &self,
        subscription_id: i64,
        only_verified: bool,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let query = if only_verified {
            format!(
                "SELECT {} FROM notification_channels WHERE subscription_id = ? AND is_verified = 1 ORDER BY id",
                CHANNEL_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM notification_channels WHERE subscription_id = ? ORDER BY id",
                CHANNEL_COLUMNS
            )
        };

        let rows = sqlx::query_as::<_, ChannelRow>(&query)
            .bind(subscription_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(rows.into_iter().map(map_channel).collect())
    }

    async fn find_by_kind(
        &self,
        subscription_id: i64,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {} FROM notification_channels WHERE subscription_id = ? AND channel_kind = ?",
            CHANNEL_COLUMNS
        ))
        .bind(subscription_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(map_channel))
    }

    async fn reset_pending(
        &self,
        id: i64,
        code: &str,
        expires_at: i64,
        destination: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_channels
            SET verification_code = ?, verification_expires = ?, is_verified = 0, destination = ?
            WHERE id = ?
            "#,
        )
        .bind(code)
        .bind(expires_at)
        .bind(destination)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ChannelNotFound(id));
        }
        Ok(())
    }

    async fn mark_verified(&self, id: i64, destination: Option<&str>) -> Result<(), StoreError> {
        let result = match destination {
            Some(dest) => sqlx::query(
                r#"
                UPDATE notification_channels
                SET is_verified = 1, destination = ?, verification_code = NULL, verification_expires = NULL
                WHERE id = ?
                "#,
            )
            .bind(dest)
            .bind(id)
            .execute(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                UPDATE notification_channels
                SET is_verified = 1, verification_code = NULL, verification_expires = NULL
                WHERE id = ?
                "#,
            )
            .bind(id)
            .execute(&self.pool)
            .await,
        }
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ChannelNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_subscription_creates_and_updates() {
        let db = db().await;
        let address = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

        let created = db
            .upsert_subscription(address, 5.0, 900, Brand::Jpool)
            .await
            .unwrap();
        assert_eq!(created.address, address);
        assert_eq!(created.threshold, 5.0);
        assert!(created.active);
        assert!(created.last_balance.is_none());

        let updated = db
            .upsert_subscription(address, 7.5, 600, Brand::Jpool)
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.threshold, 7.5);
        assert_eq!(updated.check_interval_secs, 600);
    }

    #[tokio::test]
    async fn test_record_balance_check() {
        let db = db().await;
        let sub = db
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();

        db.record_balance_check(sub.id, 4.2, 1000).await.unwrap();

        let reloaded = db.find_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_balance, Some(4.2));
        assert_eq!(reloaded.last_checked, Some(1000));
    }

    #[tokio::test]
    async fn test_deactivated_subscription_not_listed() {
        let db = db().await;
        let sub = db
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();

        assert_eq!(db.find_active_subscriptions().await.unwrap().len(), 1);
        db.set_active(sub.id, false).await.unwrap();
        assert!(db.find_active_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_channel_kind_rejected() {
        let db = db().await;
        let sub = db
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();

        let new = NewChannel {
            subscription_id: sub.id,
            kind: ChannelKind::Email,
            destination: Some("a@b.co".to_string()),
            verified: false,
            verification_code: Some("123456".to_string()),
            verification_expires: Some(1000),
        };
        db.create_channel(new.clone()).await.unwrap();

        let err = db.create_channel(new).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateChannel { .. }));
    }

    #[tokio::test]
    async fn test_mark_verified_clears_pending_code() {
        let db = db().await;
        let sub = db
            .upsert_subscription("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", 5.0, 900, Brand::Jpool)
            .await
            .unwrap();

        let channel = db
            .create_channel(NewChannel {
                subscription_id: sub.id,
                kind: ChannelKind::Telegram,
                destination: None,
                verified: false,
                verification_code: Some("654321".to_string()),
                verification_expires: Some(1000),
            })
            .await
            .unwrap();

        db.mark_verified(channel.id, Some("111222333")).await.unwrap();

        let reloaded = db.find_channel(channel.id).await.unwrap().unwrap();
        assert!(reloaded.verified);
        assert_eq!(reloaded.destination.as_deref(), Some("111222333"));
        assert!(reloaded.verification_code.is_none());
        assert!(reloaded.verification_expires.is_none());

        let verified = db.find_by_subscription(sub.id, true).await.unwrap();
        assert_eq!(verified.len(), 1);
    }
}
