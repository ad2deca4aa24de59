//! SQLite engine implementing the database capability.
//!
//! [`ConnectOptions`] are interpreted as follows:
//!
//! | `url`                     | `localPath` | Database                          |
//! |---------------------------|-------------|-----------------------------------|
//! | `:memory:` or `local`     | absent      | private in-memory database        |
//! | `:memory:` or `local`     | present     | the file at `localPath`           |
//! | `file:` URL or plain path | absent      | that file                         |
//! | `file:` URL or plain path | present     | embedded replica of that file     |
//! | any other scheme          | any         | rejected                          |
//!
//! An embedded replica keeps two connections: writes go to the primary and
//! reads are served from the replica file at `localPath`, which is refreshed
//! from the primary with SQLite's online backup API at connect time and on
//! every `sync`. The authentication token is ignored; remote servers are
//! reached through [`RemoteDriver`](super::RemoteDriver).

use std::ffi::c_int;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;
use url::Url;

use sqlbridge_config::{Config, DEFAULT_BUSY_TIMEOUT_MS};
use sqlbridge_protocol::{ConnectOptions, ExecuteResult};

use super::{DatabaseDriver, DatabaseHandle, EngineError, NativeRows};
use crate::codec::NativeValue;

const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::database");
const MEMORY_URL: &str = ":memory:";
const LOCAL_URL: &str = "local";
const FILE_SCHEME: &str = "file:";
const BACKUP_PAGES_PER_STEP: c_int = 256;

/// Driver opening SQLite databases through `rusqlite`.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDriver {
    busy_timeout: Duration,
}

impl SqliteDriver {
    /// Creates a driver whose connections wait `busy_timeout` on locks.
    #[must_use]
    pub const fn new(busy_timeout: Duration) -> Self {
        Self { busy_timeout }
    }

    /// Creates a driver tuned by the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.busy_timeout())
    }

    pub(super) fn open_connection(&self, path: Option<&Path>) -> Result<Connection, EngineError> {
        let connection = match path {
            None => Connection::open_in_memory()?,
            Some(path) => {
                ensure_parent_directory(path)?;
                Connection::open(path)?
            }
        };
        connection.busy_timeout(self.busy_timeout)?;
        Ok(connection)
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }
}

impl DatabaseDriver for SqliteDriver {
    fn open(&self, options: &ConnectOptions) -> Result<Box<dyn DatabaseHandle>, EngineError> {
        let location = Target::resolve(options)?;
        debug!(target: ENGINE_TARGET, ?location, "opening database");
        let engine = match location {
            Target::Memory => Engine::Single(self.open_connection(None)?),
            Target::File(path) => Engine::Single(self.open_connection(Some(&path))?),
            Target::Replica { primary, replica } => {
                let primary = self.open_connection(Some(&primary))?;
                let mut replica = self.open_connection(Some(&replica))?;
                pull(&primary, &mut replica)?;
                Engine::Replica { primary, replica }
            }
        };
        Ok(Box::new(SqliteHandle {
            engine: Mutex::new(Some(engine)),
        }))
    }
}

/// Where a connect request points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Memory,
    File(PathBuf),
    Replica { primary: PathBuf, replica: PathBuf },
}

impl Target {
    fn resolve(options: &ConnectOptions) -> Result<Self, EngineError> {
        let local = options
            .local_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let url = options.url.trim();

        if url == MEMORY_URL || url.eq_ignore_ascii_case(LOCAL_URL) {
            return Ok(local.map_or(Self::Memory, Self::File));
        }

        let primary = file_location(url)?;
        match local {
            None => Ok(Self::File(primary)),
            Some(replica) if replica == primary => Err(EngineError::invalid_url(
                url,
                "the replica path must differ from the primary",
            )),
            Some(replica) => Ok(Self::Replica { primary, replica }),
        }
    }
}

fn file_location(url: &str) -> Result<PathBuf, EngineError> {
    if url.is_empty() {
        return Err(EngineError::invalid_url(url, "the database url is empty"));
    }

    if let Some(rest) = url.strip_prefix(FILE_SCHEME) {
        // Connections open plain paths, so URI parameters such as `mode=ro`
        // would be dropped silently.
        if rest.contains('?') {
            return Err(EngineError::invalid_url(
                url,
                "query parameters on file urls are not supported",
            ));
        }
        if rest.starts_with("//") {
            let parsed = Url::parse(url)
                .map_err(|error| EngineError::invalid_url(url, error.to_string()))?;
            return parsed
                .to_file_path()
                .map_err(|()| EngineError::invalid_url(url, "the file url names no local path"));
        }
        if rest.is_empty() {
            return Err(EngineError::invalid_url(url, "the file url names no path"));
        }
        return Ok(PathBuf::from(rest));
    }

    // Single-letter schemes are Windows drive letters, not URLs.
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme().len() > 1 => {
            Err(EngineError::unsupported_scheme(parsed.scheme()))
        }
        _ => Ok(PathBuf::from(url)),
    }
}

fn ensure_parent_directory(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| EngineError::Directory {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Copies a consistent snapshot of `primary` into `replica`.
fn pull(primary: &Connection, replica: &mut Connection) -> Result<(), EngineError> {
    let backup = Backup::new(primary, replica)?;
    backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
    Ok(())
}

enum Engine {
    Single(Connection),
    Replica {
        primary: Connection,
        replica: Connection,
    },
}

impl Engine {
    fn writer(&self) -> &Connection {
        match self {
            Self::Single(connection) => connection,
            Self::Replica { primary, .. } => primary,
        }
    }

    fn reader(&self) -> &Connection {
        match self {
            Self::Single(connection) => connection,
            Self::Replica { replica, .. } => replica,
        }
    }

    fn close(self) -> Result<(), EngineError> {
        match self {
            Self::Single(connection) => close_connection(connection),
            Self::Replica { primary, replica } => {
                let replica_closed = close_connection(replica);
                let primary_closed = close_connection(primary);
                replica_closed.and(primary_closed)
            }
        }
    }
}

pub(super) fn close_connection(connection: Connection) -> Result<(), EngineError> {
    connection
        .close()
        .map_err(|(_connection, error)| EngineError::Sqlite(error))
}

/// `rusqlite::Connection` is not `Sync`, so each handle serializes its own
/// operations. `None` marks a closed handle.
struct SqliteHandle {
    engine: Mutex<Option<Engine>>,
}

impl SqliteHandle {
    fn with_engine<T>(
        &self,
        operation: impl FnOnce(&mut Engine) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut guard = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let engine = guard.as_mut().ok_or(EngineError::Closed)?;
        operation(engine)
    }
}

impl DatabaseHandle for SqliteHandle {
    fn execute(&self, sql: &str, params: Vec<NativeValue>) -> Result<ExecuteResult, EngineError> {
        self.with_engine(|engine| execute_on(engine.writer(), sql, params))
    }

    fn query(&self, sql: &str, params: Vec<NativeValue>) -> Result<NativeRows, EngineError> {
        self.with_engine(|engine| query_on(engine.reader(), sql, params))
    }

    fn sync(&self) -> Result<(), EngineError> {
        self.with_engine(|engine| match engine {
            Engine::Single(_) => Err(EngineError::SyncNotSupported),
            Engine::Replica { primary, replica } => pull(primary, replica),
        })
    }

    fn close(&self) -> Result<(), EngineError> {
        let engine = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::Closed)?;
        engine.close()
    }
}

fn execute_on(
    connection: &Connection,
    sql: &str,
    params: Vec<NativeValue>,
) -> Result<ExecuteResult, EngineError> {
    let mut statement = connection.prepare(sql)?;
    let changes_before = total_changes(connection)?;
    let rowid_before = connection.last_insert_rowid();
    let changed = statement.execute(params_from_iter(params))?;

    // `changes()` and `last_insert_rowid()` keep the values of the last
    // statement that modified rows, so DDL and no-op DML would echo them.
    if total_changes(connection)? == changes_before {
        return Ok(ExecuteResult::default());
    }
    let rowid = connection.last_insert_rowid();
    Ok(ExecuteResult {
        rows_affected: u64::try_from(changed).unwrap_or(u64::MAX),
        last_insert_rowid: (rowid != rowid_before).then_some(rowid),
    })
}

fn total_changes(connection: &Connection) -> Result<i64, EngineError> {
    Ok(connection.query_row("select total_changes()", [], |row| row.get(0))?)
}

pub(super) fn query_on(
    connection: &Connection,
    sql: &str,
    params: Vec<NativeValue>,
) -> Result<NativeRows, EngineError> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let width = columns.len();

    let mut cursor = statement.query(params_from_iter(params))?;
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        let cells = (0..width)
            .map(|index| row.get::<_, NativeValue>(index))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(cells);
    }
    Ok(NativeRows { columns, rows })
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn driver() -> SqliteDriver {
        SqliteDriver::default()
    }

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("temp dir")
    }

    fn path_text(path: &Path) -> String {
        path.to_str().expect("utf8 path").to_owned()
    }

    #[rstest]
    #[case(ConnectOptions::new(":memory:"), Target::Memory)]
    #[case(ConnectOptions::new("local"), Target::Memory)]
    #[case(
        ConnectOptions::new("local").with_local_path("data/app.db"),
        Target::File(PathBuf::from("data/app.db"))
    )]
    #[case(ConnectOptions::new("file:app.db"), Target::File(PathBuf::from("app.db")))]
    #[case(
        ConnectOptions::new("file:///var/lib/app.db"),
        Target::File(PathBuf::from("/var/lib/app.db"))
    )]
    #[case(ConnectOptions::new("/srv/app.db"), Target::File(PathBuf::from("/srv/app.db")))]
    #[case(
        ConnectOptions::new("file:primary.db").with_local_path("replica.db"),
        Target::Replica { primary: PathBuf::from("primary.db"), replica: PathBuf::from("replica.db") }
    )]
    fn resolves_connect_targets(#[case] options: ConnectOptions, #[case] expected: Target) {
        assert_eq!(Target::resolve(&options).expect("resolve"), expected);
    }

    #[rstest]
    #[case("libsql://db.example.com")]
    #[case("https://db.example.com")]
    #[case("wss://db.example.com")]
    fn remote_schemes_are_unsupported(#[case] url: &str) {
        let options = ConnectOptions::new(url).with_auth_token("token");
        assert!(matches!(
            Target::resolve(&options),
            Err(EngineError::UnsupportedScheme { .. })
        ));
    }

    #[rstest]
    #[case("file:app.db?mode=ro")]
    #[case("file:///var/lib/app.db?mode=ro")]
    #[case("file:?cache=shared")]
    fn file_urls_with_parameters_are_rejected(#[case] url: &str) {
        assert!(matches!(
            Target::resolve(&ConnectOptions::new(url)),
            Err(EngineError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn replica_cannot_share_the_primary_file() {
        let options = ConnectOptions::new("same.db").with_local_path("same.db");
        assert!(matches!(
            Target::resolve(&options),
            Err(EngineError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn execute_reports_changes_and_rowid(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        let created = handle
            .execute("create table t (id integer primary key, name text)", Vec::new())
            .expect("create");
        assert_eq!(created.last_insert_rowid, None);

        let inserted = handle
            .execute(
                "insert into t (name) values (?1)",
                vec![NativeValue::Text("a".into())],
            )
            .expect("insert");
        assert_eq!(inserted.rows_affected, 1);
        assert_eq!(inserted.last_insert_rowid, Some(1));
    }

    #[rstest]
    #[case("create table u (v integer)")]
    #[case("delete from t where 0")]
    #[case("update t set name = 'b' where id = 99")]
    fn statements_changing_nothing_report_nothing(driver: SqliteDriver, #[case] sql: &str) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        handle
            .execute("create table t (id integer primary key, name text)", Vec::new())
            .expect("create");
        handle
            .execute("insert into t (name) values ('a')", Vec::new())
            .expect("insert");

        let result = handle.execute(sql, Vec::new()).expect("execute");
        assert_eq!(result, ExecuteResult::default());
    }

    #[rstest]
    fn updates_report_changes_without_a_rowid(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        handle
            .execute("create table t (id integer primary key, name text)", Vec::new())
            .expect("create");
        handle
            .execute("insert into t (name) values ('a'), ('b')", Vec::new())
            .expect("insert");

        let updated = handle
            .execute("update t set name = 'c'", Vec::new())
            .expect("update");
        assert_eq!(updated.rows_affected, 2);
        assert_eq!(updated.last_insert_rowid, None);
    }

    #[rstest]
    fn query_reports_columns_for_empty_results(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        handle
            .execute("create table t (a integer, b blob)", Vec::new())
            .expect("create");
        let rows = handle.query("select a, b from t", Vec::new()).expect("query");
        assert_eq!(rows.columns, vec!["a".to_owned(), "b".to_owned()]);
        assert!(rows.rows.is_empty());
    }

    #[rstest]
    fn query_without_result_columns_is_empty(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        let rows = handle
            .query("create table t (a integer)", Vec::new())
            .expect("query");
        assert_eq!(rows, NativeRows::default());
    }

    #[rstest]
    fn query_returns_every_storage_class(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new("local")).expect("open");
        let params = vec![
            NativeValue::Null,
            NativeValue::Integer(-3),
            NativeValue::Real(0.5),
            NativeValue::Text("x".into()),
            NativeValue::Blob(vec![0, 255]),
        ];
        let rows = handle
            .query("select ?1, ?2, ?3, ?4, ?5", params.clone())
            .expect("query");
        assert_eq!(rows.rows, vec![params]);
    }

    #[rstest]
    fn closed_handles_report_closed(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        handle.close().expect("close");
        assert!(matches!(handle.close(), Err(EngineError::Closed)));
        assert!(matches!(
            handle.query("select 1", Vec::new()),
            Err(EngineError::Closed)
        ));
    }

    #[rstest]
    fn sync_requires_a_replica(driver: SqliteDriver) {
        let handle = driver.open(&ConnectOptions::new(":memory:")).expect("open");
        assert!(matches!(handle.sync(), Err(EngineError::SyncNotSupported)));
    }

    #[rstest]
    fn local_path_databases_persist(driver: SqliteDriver, temp_dir: TempDir) {
        let path = path_text(&temp_dir.path().join("nested").join("app.db"));
        let options = ConnectOptions::new("local").with_local_path(path);

        let first = driver.open(&options).expect("open");
        first
            .execute("create table t (v text)", Vec::new())
            .expect("create");
        first
            .execute("insert into t values ('kept')", Vec::new())
            .expect("insert");
        first.close().expect("close");

        let second = driver.open(&options).expect("reopen");
        let rows = second.query("select v from t", Vec::new()).expect("query");
        assert_eq!(rows.rows, vec![vec![NativeValue::Text("kept".into())]]);
    }

    #[rstest]
    fn replica_sees_primary_writes_after_sync(driver: SqliteDriver, temp_dir: TempDir) {
        let primary = path_text(&temp_dir.path().join("primary.db"));
        let replica = path_text(&temp_dir.path().join("replica.db"));
        let seed = driver
            .open(&ConnectOptions::new(primary.clone()))
            .expect("open primary");
        seed.execute("create table t (v integer)", Vec::new())
            .expect("create");
        seed.close().expect("close seed");

        let handle = driver
            .open(&ConnectOptions::new(format!("file:{primary}")).with_local_path(replica))
            .expect("open replica");
        handle
            .execute("insert into t values (42)", Vec::new())
            .expect("insert");

        let before = handle.query("select v from t", Vec::new()).expect("query");
        assert!(before.rows.is_empty());

        handle.sync().expect("sync");
        let after = handle.query("select v from t", Vec::new()).expect("query");
        assert_eq!(after.rows, vec![vec![NativeValue::Integer(42)]]);
    }
}
