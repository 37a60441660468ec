use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::delivery::types::{Recipient, RecipientSettings};
use crate::signals::types::{ClassifiedSignal, SignalData};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence contract for classified signals and registered recipients.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Append a signal; returns its assigned id.
    async fn insert_signal(&self, signal: &ClassifiedSignal) -> Result<i64, StoreError>;

    /// Most recent signals, newest first.
    async fn recent_signals(&self, limit: usize) -> Result<Vec<ClassifiedSignal>, StoreError>;

    /// Insert or replace the recipient keyed by its token.
    async fn upsert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError>;

    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError>;
}

/// SQLite-backed store. Every call runs on tokio's blocking pool so a slow or
/// locked database never stalls a runtime worker and store timeouts can fire.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Create tables
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                type TEXT NOT NULL,
                price REAL NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recipients (
                token TEXT PRIMARY KEY,
                settings TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON signals(timestamp);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    /// Count persisted signals
    pub fn count_signals(&self) -> Result<usize, StoreError> {
        let conn = lock(&self.conn)?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))?;
        Ok(count)
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            op(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn insert_signal(&self, signal: &ClassifiedSignal) -> Result<i64, StoreError> {
        let data = serde_json::to_string(&signal.data)?;
        let pair = signal.pair.clone();
        let signal_type = signal.signal_type.clone();
        let price = signal.price;
        let timestamp = signal.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO signals (pair, type, price, timestamp, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![pair, signal_type, price, timestamp, data],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn recent_signals(&self, limit: usize) -> Result<Vec<ClassifiedSignal>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pair, type, price, timestamp, data
                 FROM signals
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;

            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut signals = Vec::new();
            for row in rows {
                let (id, pair, signal_type, price, timestamp, data) = row?;
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| StoreError::Unavailable(format!("bad timestamp in row {}: {}", id, e)))?
                    .with_timezone(&Utc);
                let data: SignalData = serde_json::from_str(&data)?;

                signals.push(ClassifiedSignal {
                    id: Some(id),
                    pair,
                    signal_type,
                    price,
                    timestamp,
                    data,
                });
            }

            Ok(signals)
        })
        .await
    }

    async fn upsert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError> {
        let settings = serde_json::to_string(&recipient.settings)?;
        let token = recipient.token.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO recipients (token, settings, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(token) DO UPDATE SET settings = excluded.settings, updated_at = excluded.updated_at",
                params![token, settings, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT token, settings FROM recipients ORDER BY token")?;
            let rows =
                stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

            let mut recipients = Vec::new();
            for row in rows {
                let (token, settings) = row?;
                let settings: RecipientSettings = serde_json::from_str(&settings)?;
                recipients.push(Recipient { token, settings });
            }

            Ok(recipients)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bounded;
    use crate::signals::types::SignalKey;
    use chrono::Duration;

    fn signal(pair: &str, ts: DateTime<Utc>) -> ClassifiedSignal {
        ClassifiedSignal {
            id: None,
            pair: pair.to_string(),
            signal_type: "BUY".to_string(),
            price: 20650.0,
            timestamp: ts,
            data: SignalData {
                strategy: "Pro4x Buy".to_string(),
                ticker: pair.to_string(),
                price: "20650".to_string(),
                timeframe: "M1".to_string(),
                signal: Some(SignalKey::Pro4xBuy),
                message: None,
                title: "Pro4x Buy Setup • NQ".to_string(),
                icon: "⚡".to_string(),
                color: "#00C853".to_string(),
                video_url: None,
            },
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let first = store.insert_signal(&signal("ES", now - Duration::seconds(10))).await.unwrap();
        let second = store.insert_signal(&signal("NQ", now)).await.unwrap();
        assert!(second > first);
        assert_eq!(store.count_signals().unwrap(), 2);

        let recent = store.recent_signals(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pair, "NQ");
        assert_eq!(recent[0].id, Some(second));
        assert_eq!(recent[0].data.signal, Some(SignalKey::Pro4xBuy));

        let limited = store.recent_signals(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].pair, "NQ");
    }

    #[tokio::test]
    async fn test_upsert_recipient_replaces_settings() {
        let store = SqliteStore::in_memory().unwrap();
        let mut recipient = Recipient {
            token: "ExponentPushToken[abc]".to_string(),
            settings: RecipientSettings::default(),
        };
        store.upsert_recipient(&recipient).await.unwrap();

        recipient.settings.is_pro = true;
        recipient.settings.signals.insert("horus_Buy".to_string(), false);
        store.upsert_recipient(&recipient).await.unwrap();

        let all = store.recipients().await.unwrap();
        assert_eq!(all, vec![recipient]);
    }

    #[tokio::test]
    async fn test_locked_connection_times_out() {
        let store = SqliteStore::in_memory().unwrap();
        let held = store.conn.lock().unwrap();

        let result = bounded(
            std::time::Duration::from_millis(50),
            store.insert_signal(&signal("NQ", Utc::now())),
        )
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(50))));

        drop(held);
    }
}
