use crate::config::StoreSettings;
use crate::measurements::StoredMeasurement;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Read access to the measurement documents of one container.
pub trait DocumentSource: Send + Sync {
    /// All documents whose `location` equals `location`, in no particular order.
    fn find_by_location(&self, location: &str) -> anyhow::Result<Vec<StoredMeasurement>>;

    /// All documents for `location`, newest `timestamp` first. Ordering is
    /// done by the store on the raw stored value.
    fn find_by_location_desc(&self, location: &str) -> anyhow::Result<Vec<StoredMeasurement>>;
}

/// SQLite-backed document container. Each row keeps the full JSON document
/// alongside the two columns queries filter and sort on.
pub struct DocumentStore {
    container: String,
    conn: Mutex<Connection>,
}

impl DocumentStore {
    pub fn open(settings: &StoreSettings) -> anyhow::Result<Self> {
        let path = settings
            .database_path()
            .ok_or_else(|| anyhow::anyhow!("store endpoint or database name is not configured"))?;
        let container = settings
            .container
            .clone()
            .ok_or_else(|| anyhow::anyhow!("store container name is not configured"))?;
        Self::open_path(path, container)
    }

    /// Opens an existing container read-only. A missing database file or
    /// container table is an error; nothing is created.
    pub fn open_path<P: AsRef<Path>>(path: P, container: String) -> anyhow::Result<Self> {
        validate_container_name(&container)?;
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| anyhow::anyhow!("cannot open database {}: {}", path.display(), e))?;

        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![container],
            |row| row.get(0),
        )?;
        if tables == 0 {
            anyhow::bail!("container {} not found in {}", container, path.display());
        }

        debug!("Opened container {} in {}", container, path.display());
        Ok(Self {
            container,
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(container: &str) -> anyhow::Result<Self> {
        validate_container_name(container)?;
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&schema_sql(container))?;
        Ok(Self {
            container: container.to_string(),
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("document store connection poisoned"))
    }

    fn query(&self, location: &str, ordered: bool) -> anyhow::Result<Vec<StoredMeasurement>> {
        let mut sql = format!(r#"SELECT data FROM "{}" WHERE location = ?1"#, self.container);
        if ordered {
            sql.push_str(" ORDER BY timestamp DESC");
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![location], |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(serde_json::from_str(&row?)?);
        }

        debug!(
            "Container {} returned {} documents for {}",
            self.container,
            documents.len(),
            location
        );
        Ok(documents)
    }

    #[cfg(test)]
    pub fn insert(&self, document: &serde_json::Value) -> anyhow::Result<()> {
        let location = document["location"].as_str().unwrap_or_default();
        let timestamp = document["timestamp"].as_str().unwrap_or_default();
        let conn = self.lock()?;
        conn.execute(
            &format!(
                r#"INSERT INTO "{}" (id, location, timestamp, data) VALUES (?1, ?2, ?3, ?4)"#,
                self.container
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                location,
                timestamp,
                document.to_string()
            ],
        )?;
        Ok(())
    }
}

impl DocumentSource for DocumentStore {
    fn find_by_location(&self, location: &str) -> anyhow::Result<Vec<StoredMeasurement>> {
        self.query(location, false)
    }

    fn find_by_location_desc(&self, location: &str) -> anyhow::Result<Vec<StoredMeasurement>> {
        self.query(location, true)
    }
}

#[cfg(test)]
fn schema_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY,
            location TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            data JSON NOT NULL
        );

        CREATE INDEX IF NOT EXISTS "idx_{table}_location_timestamp"
            ON "{table}"(location, timestamp);
        "#
    )
}

fn validate_container_name(name: &str) -> anyhow::Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        anyhow::bail!("invalid container name {name:?}");
    }
    Ok(())
}
