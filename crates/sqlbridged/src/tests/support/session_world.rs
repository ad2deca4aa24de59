//! Session lifecycle world: a dispatcher over real SQLite databases.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use sqlbridge_protocol::{
    CloseOptions, CommandError, ConnectOptions, ConnectionId, ExecuteOptions, QueryOptions,
    QueryResult, SyncOptions, Value,
};

use crate::commands::CommandDispatcher;
use crate::database::SqliteDriver;

pub type StepResult = Result<(), String>;

/// Scenario world shared across session steps.
pub struct SessionWorld {
    pub dispatcher: Arc<CommandDispatcher<SqliteDriver>>,
    dir: TempDir,
    session: Option<ConnectionId>,
    minted: Vec<ConnectionId>,
    race_outcomes: Vec<Result<(), CommandError>>,
    last_query: Option<QueryResult>,
    last_error: Option<CommandError>,
}

impl SessionWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(SqliteDriver::default())),
            dir: TempDir::new().expect("failed to create temporary database directory"),
            session: None,
            minted: Vec::new(),
            race_outcomes: Vec::new(),
            last_query: None,
            last_error: None,
        }
    }

    pub fn primary_path(&self) -> String {
        path_text(self.dir.path().join("primary.db"))
    }

    pub fn replica_path(&self) -> String {
        path_text(self.dir.path().join("replicas").join("primary.db"))
    }

    pub fn connect(&mut self, options: &ConnectOptions) -> StepResult {
        let id = self
            .dispatcher
            .connect(options)
            .map_err(|error| error.to_string())?;
        self.session = Some(id);
        Ok(())
    }

    fn session(&self) -> Result<ConnectionId, String> {
        self.session
            .clone()
            .ok_or_else(|| "no session has been opened".to_owned())
    }

    pub fn execute(&mut self, sql: &str, params: Vec<Value>) -> StepResult {
        let options = ExecuteOptions::new(self.session()?, sql).with_params(params);
        self.dispatcher
            .execute(options)
            .map(drop)
            .map_err(|error| error.to_string())
    }

    pub fn query(&mut self, sql: &str) -> StepResult {
        let result = self
            .dispatcher
            .query(QueryOptions::new(self.session()?, sql))
            .map_err(|error| error.to_string())?;
        self.last_query = Some(result);
        Ok(())
    }

    /// Runs a statement whose failure is expected, remembering the error.
    pub fn try_execute(&mut self, sql: &str, params: Vec<Value>) -> StepResult {
        let options = ExecuteOptions::new(self.session()?, sql).with_params(params);
        self.last_error = self.dispatcher.execute(options).err();
        Ok(())
    }

    /// Runs a query whose failure is expected, remembering the error.
    pub fn try_query(&mut self, sql: &str) -> StepResult {
        let outcome = self
            .dispatcher
            .query(QueryOptions::new(self.session()?, sql));
        match outcome {
            Ok(result) => {
                self.last_query = Some(result);
                self.last_error = None;
            }
            Err(error) => {
                self.last_query = None;
                self.last_error = Some(error);
            }
        }
        Ok(())
    }

    pub fn sync(&mut self) -> StepResult {
        let options = SyncOptions {
            connection_id: self.session()?,
        };
        self.dispatcher
            .sync(&options)
            .map_err(|error| error.to_string())
    }

    /// Closes the current session, remembering the failure if any.
    pub fn close(&mut self) -> StepResult {
        let options = CloseOptions {
            connection_id: self.session()?,
        };
        self.last_error = self.dispatcher.close(&options).err();
        Ok(())
    }

    /// Creates the primary database file with an `items` table.
    pub fn seed_primary(&self) -> StepResult {
        let id = self
            .dispatcher
            .connect(&ConnectOptions::new(self.primary_path()))
            .map_err(|error| error.to_string())?;
        self.dispatcher
            .execute(ExecuteOptions::new(
                id.clone(),
                "create table items (id integer primary key, name text not null)",
            ))
            .map_err(|error| error.to_string())?;
        self.dispatcher
            .close(&CloseOptions { connection_id: id })
            .map_err(|error| error.to_string())
    }

    /// Opens `count` sessions from as many threads at once.
    pub fn connect_concurrently(&mut self, count: usize) -> StepResult {
        let dispatcher = &self.dispatcher;
        let results: Vec<Result<ConnectionId, String>> = thread::scope(|scope| {
            let workers: Vec<_> = (0..count)
                .map(|_| {
                    scope.spawn(move || {
                        dispatcher
                            .connect(&ConnectOptions::new(":memory:"))
                            .map_err(|error| error.to_string())
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap_or_else(|_| Err("connect panicked".into())))
                .collect()
        });
        self.minted = results.into_iter().collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Runs `count` inserts on the current session from separate threads while
    /// another thread closes it. The close outcome is kept as the last error.
    pub fn race_inserts_with_close(&mut self, count: usize) -> StepResult {
        let id = self.session()?;
        let dispatcher = &self.dispatcher;
        let (outcomes, closed) = thread::scope(|scope| {
            let writers: Vec<_> = (0..count)
                .map(|n| {
                    let id = id.clone();
                    scope.spawn(move || {
                        let sql = "insert into items (name) values (?)";
                        let options = ExecuteOptions::new(id, sql)
                            .with_params([Value::from(format!("racer-{n}"))]);
                        dispatcher.execute(options).map(drop)
                    })
                })
                .collect();
            let closer = scope.spawn(|| {
                dispatcher.close(&CloseOptions {
                    connection_id: id.clone(),
                })
            });
            let outcomes: Vec<_> = writers
                .into_iter()
                .map(|writer| writer.join().expect("writer panicked"))
                .collect();
            let closed = closer.join().expect("closer panicked");
            (outcomes, closed)
        });
        self.race_outcomes = outcomes;
        self.last_error = closed.err();
        Ok(())
    }

    pub fn race_outcomes(&self) -> &[Result<(), CommandError>] {
        &self.race_outcomes
    }

    pub fn minted(&self) -> &[ConnectionId] {
        &self.minted
    }

    pub fn last_query(&self) -> Result<&QueryResult, String> {
        self.last_query
            .as_ref()
            .ok_or_else(|| "no query has run".to_owned())
    }

    pub fn last_error(&self) -> Option<&CommandError> {
        self.last_error.as_ref()
    }
}

fn path_text(path: PathBuf) -> String {
    path.to_str()
        .expect("temporary database path was not valid UTF-8")
        .to_owned()
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}
