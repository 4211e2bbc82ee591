use autologin_scanner::discovery::DiscoveryStore;
use autologin_scanner::login::LoginReport;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub struct Database {
    conn: Connection,
}

/// One credential set for one target site. `login_url` and
/// `registration_url` are write-once outcomes of a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub id: String,
    pub target_url: String,
    pub username: String,
    pub password: String,
    pub login_url: Option<String>,
    pub registration_url: Option<String>,
    pub created_at: i64,
}

/// One recorded login attempt for a credential set.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub credentials_id: String,
    pub ok: bool,
    pub error: Option<String>,
    pub cookies: Option<String>, // JSON
    pub attempted_at: i64,
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

impl Database {
    pub fn drop(path: &Path) {
        fs::remove_file(path).unwrap();
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Optimize for concurrent writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    target_url TEXT NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,

    -- Discovery outcomes, each written at most once per run
    login_url TEXT,
    registration_url TEXT,

    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_target ON credentials(target_url);

CREATE TABLE IF NOT EXISTS login_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    credentials_id TEXT NOT NULL,
    ok BOOLEAN NOT NULL,
    error TEXT,
    cookies TEXT,             -- JSON array of cookie records
    attempted_at INTEGER NOT NULL,

    FOREIGN KEY(credentials_id) REFERENCES credentials(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_login_attempts_credentials
    ON login_attempts(credentials_id);
            ",
        )?;
        Ok(())
    }

    pub fn add_credentials(
        &self,
        target_url: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO credentials (id, target_url, username, password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&id, target_url, username, password, current_timestamp()],
        )?;
        Ok(id)
    }

    pub fn get_credentials(&self, id: &str) -> Result<Option<Credentials>> {
        self.conn
            .query_row(
                "SELECT id, target_url, username, password, login_url, registration_url,
                        created_at
                 FROM credentials WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Credentials {
                        id: row.get(0)?,
                        target_url: row.get(1)?,
                        username: row.get(2)?,
                        password: row.get(3)?,
                        login_url: row.get(4)?,
                        registration_url: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
    }

    pub fn list_credentials(&self) -> Result<Vec<Credentials>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_url, username, password, login_url, registration_url,
                    created_at
             FROM credentials ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Credentials {
                id: row.get(0)?,
                target_url: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                login_url: row.get(4)?,
                registration_url: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect()
    }

    pub fn delete_credentials(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Record the discovered login form URL. Write-once: a repeated call
    /// with the same value is a no-op, a conflicting value is ignored.
    pub fn record_login_url(&self, id: &str, url: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE credentials SET login_url = ?1
             WHERE id = ?2 AND (login_url IS NULL OR login_url = ?1)",
            params![url, id],
        )?;
        Ok(changed > 0)
    }

    /// Same write-once contract as [`Database::record_login_url`].
    pub fn record_registration_url(&self, id: &str, url: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE credentials SET registration_url = ?1
             WHERE id = ?2 AND (registration_url IS NULL OR registration_url = ?1)",
            params![url, id],
        )?;
        Ok(changed > 0)
    }

    pub fn record_login_attempt(&self, credentials_id: &str, report: &LoginReport) -> Result<i64> {
        let cookies_json = report
            .cookies
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok());
        self.conn.execute(
            "INSERT INTO login_attempts (credentials_id, ok, error, cookies, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                credentials_id,
                report.ok,
                &report.error,
                &cookies_json,
                current_timestamp()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_login_attempts(&self, credentials_id: &str) -> Result<Vec<LoginAttempt>> {
        let mut stmt = self.conn.prepare(
            "SELECT credentials_id, ok, error, cookies, attempted_at
             FROM login_attempts WHERE credentials_id = ?1 ORDER BY attempted_at",
        )?;
        let rows = stmt.query_map(params![credentials_id], |row| {
            Ok(LoginAttempt {
                credentials_id: row.get(0)?,
                ok: row.get(1)?,
                error: row.get(2)?,
                cookies: row.get(3)?,
                attempted_at: row.get(4)?,
            })
        })?;
        rows.collect()
    }
}

/// Adapter exposing one credential row as the discovery run's store.
/// Holds the connection behind a mutex so the async crawl can record from
/// its event loop.
pub struct CredentialStore {
    db: Mutex<Database>,
    credentials_id: String,
}

impl CredentialStore {
    pub fn new(db: Database, credentials_id: &str) -> Self {
        Self {
            db: Mutex::new(db),
            credentials_id: credentials_id.to_string(),
        }
    }
}

impl DiscoveryStore for CredentialStore {
    fn record_login_url(&self, url: &str) {
        let db = self.db.lock().unwrap();
        if let Err(e) = db.record_login_url(&self.credentials_id, url) {
            warn!("could not persist login URL {}: {}", url, e);
        }
    }

    fn record_registration_url(&self, url: &str) {
        let db = self.db.lock().unwrap();
        if let Err(e) = db.record_registration_url(&self.credentials_id, url) {
            warn!("could not persist registration URL {}: {}", url, e);
        }
    }
}
