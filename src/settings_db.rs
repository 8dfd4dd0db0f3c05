use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::models::Credentials;

const KEY_HOST: &str = "gerritHost";
const KEY_USER: &str = "gerritUser";
const KEY_PASS: &str = "gerritPass";

/// Jirrit's SQLite key/value store. Holds the Gerrit credentials so they
/// survive restarts.
#[derive(Clone)]
pub struct SettingsDb {
    db_path: PathBuf,
}

impl SettingsDb {
    /// Create the data directory and the settings table if needed.
    pub fn init(app_data_dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(app_data_dir)
            .map_err(|e| format!("Failed to create app data dir: {e}"))?;

        let db_path = app_data_dir.join("jirrit.db");
        let settings_db = Self { db_path };

        let conn = settings_db.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| format!("Failed to create settings table: {e}"))?;

        log::debug!("settings db ready at {}", settings_db.db_path.display());
        Ok(settings_db)
    }

    fn open(&self) -> Result<Connection, String> {
        Connection::open(&self.db_path).map_err(|e| {
            format!(
                "Failed to open settings DB at {}: {e}",
                self.db_path.display()
            )
        })
    }

    fn get(conn: &Connection, key: &str) -> Result<Option<String>, String> {
        conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| format!("Failed to read setting {key}: {e}"))
    }

    /// Read the stored credentials. Missing keys read as empty strings.
    pub fn load_credentials(&self) -> Result<Credentials, String> {
        let conn = self.open()?;
        Ok(Credentials {
            host: Self::get(&conn, KEY_HOST)?.unwrap_or_default(),
            user: Self::get(&conn, KEY_USER)?.unwrap_or_default(),
            pass: Self::get(&conn, KEY_PASS)?.unwrap_or_default(),
        })
    }

    /// Overwrite all three credential fields in one transaction.
    pub fn save_credentials(&self, creds: &Credentials) -> Result<(), String> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| format!("Failed to begin settings transaction: {e}"))?;
        for (key, value) in [
            (KEY_HOST, &creds.host),
            (KEY_USER, &creds.user),
            (KEY_PASS, &creds.pass),
        ] {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                rusqlite::params![key, value],
            )
            .map_err(|e| format!("Failed to store setting {key}: {e}"))?;
        }
        tx.commit()
            .map_err(|e| format!("Failed to commit settings: {e}"))?;
        log::info!("saved Gerrit credentials for host={:?}", creds.host);
        Ok(())
    }

    /// Async wrapper that keeps SQLite I/O off the event loop.
    pub async fn load_credentials_async(&self) -> Result<Credentials, String> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.load_credentials())
            .await
            .map_err(|e| format!("Settings read task failed: {e}"))?
    }

    pub async fn save_credentials_async(&self, creds: Credentials) -> Result<(), String> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.save_credentials(&creds))
            .await
            .map_err(|e| format!("Settings write task failed: {e}"))?
    }
}
