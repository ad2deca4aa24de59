//! Remote libsql servers reached over HTTP.
//!
//! `libsql:`, `http(s):` and `ws(s):` URLs name a libsql server. The
//! `authToken` is sent with every request; an absent token is sent empty,
//! which servers without authentication accept. `libsql:` and `wss:` are
//! spoken as `https:` and `ws:` as `http:`.
//!
//! Without a `localPath`, statements and queries run on the server. With one,
//! the session is an embedded replica: writes still go to the server, while
//! reads are served from a SQLite file at `localPath`. The replica is a full
//! snapshot of the server's schema and rows, taken at connect time and again
//! on every `sync`.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use libsql::{Builder, Connection as RemoteConnection, Database};
use once_cell::sync::OnceCell;
use rusqlite::{Connection, params_from_iter};
use tokio::runtime::{self, Runtime};
use tracing::debug;
use url::Url;

use sqlbridge_config::{Config, DEFAULT_REMOTE_TIMEOUT_MS};
use sqlbridge_protocol::{ConnectOptions, ExecuteResult};

use super::sqlite::{SqliteDriver, close_connection, query_on};
use super::{DatabaseDriver, DatabaseHandle, EngineError, NativeRows};
use crate::codec::NativeValue;

const REMOTE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::database::remote");
const REMOTE_SCHEMES: [&str; 5] = ["libsql", "http", "https", "ws", "wss"];
const RUNTIME_THREADS: usize = 2;

/// Server objects copied into a replica. Tables come first so their rows can
/// be loaded before indexes and triggers exist.
const SCHEMA_SQL: &str = "select type, name, sql from sqlite_master \
     where sql is not null and name not like 'sqlite_%' and name not like 'libsql_%' \
     order by case type when 'table' then 0 else 1 end, rowid";

/// Reports whether `url` names a remote libsql server.
pub(super) fn is_remote(url: &str) -> bool {
    Url::parse(url.trim()).is_ok_and(|parsed| REMOTE_SCHEMES.contains(&parsed.scheme()))
}

/// Rewrites a remote URL to the HTTP endpoint the client speaks to.
fn http_endpoint(url: &str) -> Result<String, EngineError> {
    let url = url.trim();
    let parsed = Url::parse(url).map_err(|error| EngineError::invalid_url(url, error.to_string()))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(EngineError::invalid_url(url, "the remote url names no host"));
    }
    let scheme = match parsed.scheme() {
        "libsql" | "https" | "wss" => "https",
        "http" | "ws" => "http",
        other => return Err(EngineError::unsupported_scheme(other)),
    };
    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| EngineError::invalid_url(url, "the remote url has no authority"))?;
    Ok(format!("{scheme}://{rest}"))
}

/// Tokio runtime and per-request deadline shared by remote sessions.
#[derive(Clone)]
struct Network {
    runtime: Arc<Runtime>,
    timeout: Duration,
}

impl Network {
    fn run<F: Future>(&self, operation: &'static str, future: F) -> Result<F::Output, EngineError> {
        self.runtime
            .block_on(async { tokio::time::timeout(self.timeout, future).await })
            .map_err(|_elapsed| EngineError::TimedOut {
                operation,
                after: self.timeout,
            })
    }
}

/// Driver opening sessions on remote libsql servers.
///
/// The async client runs on a small Tokio runtime built on first use, which
/// the blocking worker threads drive with `block_on`.
pub struct RemoteDriver {
    replica: SqliteDriver,
    timeout: Duration,
    runtime: OnceCell<Arc<Runtime>>,
}

impl RemoteDriver {
    /// Creates a driver whose remote requests give up after `timeout`.
    /// Replica files are opened with `replica`.
    #[must_use]
    pub fn new(replica: SqliteDriver, timeout: Duration) -> Self {
        Self {
            replica,
            timeout,
            runtime: OnceCell::new(),
        }
    }

    /// Creates a driver tuned by the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(SqliteDriver::from_config(config), config.remote_timeout())
    }

    fn network(&self) -> Result<Network, EngineError> {
        let runtime = self.runtime.get_or_try_init(|| {
            runtime::Builder::new_multi_thread()
                .worker_threads(RUNTIME_THREADS)
                .thread_name(concat!(env!("CARGO_PKG_NAME"), "-remote"))
                .enable_all()
                .build()
                .map(Arc::new)
                .map_err(|source| EngineError::Runtime { source })
        })?;
        Ok(Network {
            runtime: Arc::clone(runtime),
            timeout: self.timeout,
        })
    }
}

impl Default for RemoteDriver {
    fn default() -> Self {
        Self::new(
            SqliteDriver::default(),
            Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
        )
    }
}

impl DatabaseDriver for RemoteDriver {
    fn open(&self, options: &ConnectOptions) -> Result<Box<dyn DatabaseHandle>, EngineError> {
        let endpoint = http_endpoint(&options.url)?;
        let token = options.auth_token.clone().unwrap_or_default();
        let network = self.network()?;
        let runtime = Arc::clone(&network.runtime);
        let _context = runtime.enter();
        debug!(target: REMOTE_TARGET, %endpoint, replica = ?options.local_path, "opening remote database");

        let database = network.run("connect", Builder::new_remote(endpoint, token).build())??;
        let connection = database.connect()?;
        let replica = match options.local_path.as_deref().filter(|path| !path.trim().is_empty()) {
            None => None,
            Some(path) => {
                let mut replica = self.replica.open_connection(Some(Path::new(path)))?;
                pull_snapshot(&network, &connection, &mut replica)?;
                Some(replica)
            }
        };

        Ok(Box::new(RemoteHandle {
            network,
            session: Mutex::new(Some(RemoteSession {
                _database: database,
                connection,
                replica,
            })),
        }))
    }
}

/// Dropping the client may queue a close request on the runtime, so sessions
/// are only dropped inside its context.
struct RemoteSession {
    _database: Database,
    connection: RemoteConnection,
    replica: Option<Connection>,
}

/// `None` marks a closed handle.
struct RemoteHandle {
    network: Network,
    session: Mutex<Option<RemoteSession>>,
}

impl RemoteHandle {
    fn with_session<T>(
        &self,
        operation: impl FnOnce(&mut RemoteSession) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let session = guard.as_mut().ok_or(EngineError::Closed)?;
        operation(session)
    }
}

impl DatabaseHandle for RemoteHandle {
    fn execute(&self, sql: &str, params: Vec<NativeValue>) -> Result<ExecuteResult, EngineError> {
        self.with_session(|session| {
            let connection = &session.connection;
            let rowid_before = connection.last_insert_rowid();
            let params: Vec<libsql::Value> = params.into_iter().map(to_remote).collect();
            let changed = self.network.run("execute", connection.execute(sql, params))??;
            let rowid = connection.last_insert_rowid();
            Ok(ExecuteResult {
                rows_affected: changed,
                last_insert_rowid: (changed > 0 && rowid != rowid_before).then_some(rowid),
            })
        })
    }

    fn query(&self, sql: &str, params: Vec<NativeValue>) -> Result<NativeRows, EngineError> {
        self.with_session(|session| match &session.replica {
            Some(replica) => query_on(replica, sql, params),
            None => {
                let params = params.into_iter().map(to_remote).collect();
                Ok(self
                    .network
                    .run("query", fetch(&session.connection, sql, params))??)
            }
        })
    }

    fn sync(&self) -> Result<(), EngineError> {
        self.with_session(|session| match session.replica.as_mut() {
            None => Err(EngineError::SyncNotSupported),
            Some(replica) => pull_snapshot(&self.network, &session.connection, replica),
        })
    }

    fn close(&self) -> Result<(), EngineError> {
        let _context = self.network.runtime.enter();
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::Closed)?;
        session.replica.map_or(Ok(()), close_connection)
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        let _context = self.network.runtime.enter();
        drop(
            self.session
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

async fn fetch(
    connection: &RemoteConnection,
    sql: &str,
    params: Vec<libsql::Value>,
) -> Result<NativeRows, libsql::Error> {
    let mut cursor = connection.query(sql, params).await?;
    let width = cursor.column_count();
    let columns = (0..width)
        .map(|index| cursor.column_name(index).unwrap_or_default().to_owned())
        .collect();

    let mut rows = Vec::new();
    while let Some(row) = cursor.next().await? {
        let cells = (0..width)
            .map(|index| row.get_value(index).map(from_remote))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(cells);
    }
    Ok(NativeRows { columns, rows })
}

/// A server object and, for tables, every row it holds.
struct SnapshotObject {
    kind: String,
    name: String,
    sql: String,
    rows: Vec<Vec<NativeValue>>,
}

async fn download(connection: &RemoteConnection) -> Result<Vec<SnapshotObject>, EngineError> {
    let schema = fetch(connection, SCHEMA_SQL, Vec::new()).await?;
    let mut objects = Vec::with_capacity(schema.rows.len());
    for row in schema.rows {
        let [kind, name, sql] = <[NativeValue; 3]>::try_from(row)
            .map_err(|_| EngineError::other("unexpected shape of the remote schema"))?;
        let (NativeValue::Text(kind), NativeValue::Text(name), NativeValue::Text(sql)) =
            (kind, name, sql)
        else {
            return Err(EngineError::other("remote schema entries must be text"));
        };
        let rows = if kind == "table" {
            let select = format!("select * from {}", quote_identifier(&name));
            fetch(connection, &select, Vec::new()).await?.rows
        } else {
            Vec::new()
        };
        objects.push(SnapshotObject {
            kind,
            name,
            sql,
            rows,
        });
    }
    Ok(objects)
}

/// Replaces the replica's contents with the server's current state.
fn pull_snapshot(
    network: &Network,
    remote: &RemoteConnection,
    replica: &mut Connection,
) -> Result<(), EngineError> {
    let objects = network.run("sync", download(remote))??;

    let transaction = replica.transaction()?;
    clear_schema(&transaction)?;
    for object in objects.iter().filter(|object| object.kind == "table") {
        transaction.execute_batch(&object.sql)?;
        let Some(width) = object.rows.first().map(Vec::len) else {
            continue;
        };
        let placeholders = vec!["?"; width].join(", ");
        let insert = format!(
            "insert into {} values ({placeholders})",
            quote_identifier(&object.name)
        );
        let mut statement = transaction.prepare(&insert)?;
        for row in &object.rows {
            statement.execute(params_from_iter(row.iter()))?;
        }
    }
    for object in objects.iter().filter(|object| object.kind != "table") {
        transaction.execute_batch(&object.sql)?;
    }
    transaction.commit()?;

    debug!(target: REMOTE_TARGET, objects = objects.len(), "replica refreshed from remote");
    Ok(())
}

fn clear_schema(connection: &Connection) -> Result<(), EngineError> {
    let mut statement = connection.prepare(
        "select type, name from sqlite_master \
         where type in ('view', 'table') and name not like 'sqlite_%' \
         order by case type when 'view' then 0 else 1 end",
    )?;
    let objects = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (kind, name) in objects {
        connection.execute_batch(&format!("drop {kind} if exists {}", quote_identifier(&name)))?;
    }
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_remote(value: NativeValue) -> libsql::Value {
    match value {
        NativeValue::Null => libsql::Value::Null,
        NativeValue::Integer(integer) => libsql::Value::Integer(integer),
        NativeValue::Real(real) => libsql::Value::Real(real),
        NativeValue::Text(text) => libsql::Value::Text(text),
        NativeValue::Blob(bytes) => libsql::Value::Blob(bytes),
    }
}

fn from_remote(value: libsql::Value) -> NativeValue {
    match value {
        libsql::Value::Null => NativeValue::Null,
        libsql::Value::Integer(integer) => NativeValue::Integer(integer),
        libsql::Value::Real(real) => NativeValue::Real(real),
        libsql::Value::Text(text) => NativeValue::Text(text),
        libsql::Value::Blob(bytes) => NativeValue::Blob(bytes),
    }
}
