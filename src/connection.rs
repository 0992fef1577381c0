//! MonetDB database connection
//!
//! This module provides the main `Connection` type for interacting with MonetDB.
//!
//! # Example
//!
//! ```rust,no_run
//! use monetdb_rs::{Config, Connection};
//!
//! # async fn example() -> monetdb_rs::Result<()> {
//! let config = Config::new("localhost", 50000, "demo", "monetdb", "monetdb");
//! let conn = Connection::connect(config).await?;
//!
//! let rs = conn.query("SELECT id, name FROM sys.tables").await?;
//! for row in rs.rows() {
//!     println!("{:?}", row);
//! }
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;

use crate::config::{Config, Credentials};
use crate::constants::MAX_REDIRECTS;
use crate::crypto::HashAlgorithm;
use crate::error::{Error, Result};
use crate::messages::{classify_failure, AuthMessage, AuthReply, Challenge, RedirectTarget};
use crate::packet::Frame;
use crate::result::{QueryOutcome, ResultDecoder, ResultSet};
use crate::session::{Session, SessionState};
use crate::statement::Statement;
use crate::transport::{self, Transport};

/// Server information obtained during the handshake
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// `mserver` or `merovingian`, from the last challenge
    pub server_type: String,
    /// MAPI protocol version
    pub protocol: String,
    /// Digest algorithm used for the login
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Algorithm the server stores password hashes with
    pub password_hash: Option<HashAlgorithm>,
    /// Server byte order marker
    pub endianness: String,
    /// Host actually logged in to (after redirects)
    pub host: String,
    /// Port actually logged in to
    pub port: u16,
    /// Database logged in to
    pub database: String,
    /// Number of redirects followed
    pub redirects: usize,
}

/// State that must not wait on I/O
#[derive(Debug, Default)]
struct Shared {
    session: Session,
    server_info: ServerInfo,
    auto_commit: bool,
}

/// State owned by whoever is talking to the server
struct Io {
    transport: Option<Box<dyn Transport>>,
    config: Config,
}

impl Io {
    /// Send one command and wait for its reply
    async fn round_trip(&mut self, statement: &Statement) -> Result<Frame> {
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.send(&statement.encode()).await?;
        transport.receive().await
    }

    async fn shutdown_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "error while closing transport");
            }
        }
    }
}

// Connection ID counter
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A connection to a MonetDB server.
///
/// Commands take `&self`, but a connection runs one command at a time. A
/// second command issued while one is in flight fails immediately with
/// [`Error::Busy`] rather than waiting. If a command future is dropped
/// before its reply arrives, the connection can no longer tell where the
/// next reply starts and moves to [`SessionState::Failed`].
///
/// # Thread Safety
///
/// `Connection` is `Send` and `Sync`. For parallel query execution, use
/// multiple connections.
pub struct Connection {
    io: Mutex<Io>,
    shared: StdMutex<Shared>,
    id: u64,
}

impl Connection {
    /// Create a disconnected connection; no I/O happens until [`open`](Self::open)
    pub fn new(config: Config) -> Self {
        Self {
            io: Mutex::new(Io {
                transport: None,
                config,
            }),
            shared: StdMutex::new(Shared::default()),
            id: CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Connect and log in
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use monetdb_rs::{Config, Connection};
    /// use std::time::Duration;
    ///
    /// # async fn example() -> monetdb_rs::Result<()> {
    /// let config = Config::new("localhost", 50000, "demo", "monetdb", "monetdb")
    ///     .connect_timeout(Duration::from_secs(5));
    /// let conn = Connection::connect(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: Config) -> Result<Self> {
        let conn = Self::new(config);
        conn.open().await?;
        Ok(conn)
    }

    /// Connect using a `mapi:monetdb://` URL
    pub async fn connect_url(url: &str) -> Result<Self> {
        let config: Config = url.parse()?;
        Self::connect(config).await
    }

    /// Run the handshake on a disconnected connection
    ///
    /// On failure the connection is left in [`SessionState::Failed`].
    pub async fn open(&self) -> Result<()> {
        let mut io = self.io.try_lock().map_err(|_| Error::Busy)?;
        self.open_locked(&mut io).await
    }

    /// Drop the current session and connect again with the same configuration
    ///
    /// Only possible when the password was retained with
    /// [`Config::retain_password_for_reconnect`].
    pub async fn reconnect(&self) -> Result<()> {
        let mut io = self.io.lock().await;
        io.shutdown_transport().await;
        {
            let mut shared = self.shared();
            shared.session = Session::new();
            shared.server_info = ServerInfo::default();
        }
        tracing::debug!(conn_id = self.id, "reconnecting");
        self.open_locked(&mut io).await
    }

    /// Get the connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.shared().session.state()
    }

    /// Get server information
    pub fn server_info(&self) -> ServerInfo {
        self.shared().server_info.clone()
    }

    /// Server-side auto-commit as last reported
    pub fn auto_commit(&self) -> bool {
        self.shared().auto_commit
    }

    /// Non-blocking liveness probe
    ///
    /// Performs no round trip: it checks the session state and whether the
    /// peer has closed the socket.
    pub fn is_alive(&self) -> bool {
        match self.io.try_lock() {
            Ok(io) => {
                self.state() == SessionState::Ready
                    && io.transport.as_ref().map(|t| t.is_alive()).unwrap_or(false)
            }
            // a command holds the lock
            Err(_) => self.state() == SessionState::Busy,
        }
    }

    /// Execute a SQL statement
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use monetdb_rs::{Connection, QueryOutcome};
    /// # async fn example(conn: Connection) -> monetdb_rs::Result<()> {
    /// match conn.execute("UPDATE t SET x = 1").await? {
    ///     QueryOutcome::Update { affected, .. } => println!("{} rows", affected),
    ///     other => println!("{:?}", other),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        let statement = Statement::query(sql);
        let (mut io, generation) = self.claim("execute", None)?;
        tracing::debug!(
            conn_id = self.id,
            statement_type = ?statement.statement_type(),
            "executing statement"
        );

        let result = async {
            let frame = io.round_trip(&statement).await?;
            ResultDecoder::decode(&frame)
        }
        .await;
        self.finish(&mut io, &result);

        let mut outcome = result?;
        match &mut outcome {
            QueryOutcome::Rows(rs) | QueryOutcome::Prepared(rs) => {
                rs.connection_id = self.id;
                rs.generation = generation;
            }
            QueryOutcome::Transaction { auto_commit } => self.shared().auto_commit = *auto_commit,
            _ => {}
        }
        Ok(outcome)
    }

    /// Execute a statement that must return rows
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.execute(sql).await?.into_result_set().ok_or_else(|| {
            Error::UnexpectedResponse("statement did not return a result set".to_string())
        })
    }

    /// Fetch the next block of rows for `rs`
    ///
    /// Returns the number of rows added; `0` once everything is fetched.
    /// Fails with [`Error::ResultSetInvalidated`] if another command ran on
    /// this connection after `rs` was produced.
    pub async fn fetch_more(&self, rs: &mut ResultSet) -> Result<usize> {
        if !rs.has_more() {
            return Ok(0);
        }

        let (mut io, generation) = self.claim("fetch", Some(&*rs))?;
        let remaining = rs.total_rows() - rs.fetched();
        let count = remaining.min(u64::from(io.config.reply_size.max(1)));
        let statement = Statement::export(rs.query_id(), rs.fetched(), count);
        tracing::trace!(conn_id = self.id, query_id = rs.query_id(), offset = rs.fetched(), count, "fetching rows");

        let result = async {
            let frame = io.round_trip(&statement).await?;
            ResultDecoder::decode_block(&frame, rs)
        }
        .await;
        self.finish(&mut io, &result);

        let added = result?;
        rs.generation = generation;
        Ok(added)
    }

    /// Fetch every remaining row of `rs`
    pub async fn fetch_all(&self, rs: &mut ResultSet) -> Result<()> {
        while rs.has_more() {
            if self.fetch_more(rs).await? == 0 {
                return Err(Error::decode(format!(
                    "server returned no rows for query {} at offset {}",
                    rs.query_id(),
                    rs.fetched()
                )));
            }
        }
        Ok(())
    }

    /// Release the server-side result for `rs`
    ///
    /// Results that were fully delivered need no server round trip.
    pub async fn close_result(&self, rs: ResultSet) -> Result<()> {
        if rs.connection_id != self.id {
            return Err(Error::ResultSetInvalidated {
                query_id: rs.query_id(),
            });
        }
        if !rs.has_more() {
            return Ok(());
        }
        self.control_statement(Statement::close(rs.query_id()), "close result")
            .await
    }

    /// Send a raw control command such as `reply_size 500`
    pub async fn control(&self, command: &str) -> Result<()> {
        self.control_statement(Statement::control(command), "control")
            .await
    }

    /// Change the number of rows returned with the first reply of a query
    pub async fn set_reply_size(&self, rows: u32) -> Result<()> {
        self.control_statement(Statement::reply_size(rows), "set reply size")
            .await?;
        self.io.lock().await.config.reply_size = rows;
        Ok(())
    }

    /// Switch server-side auto-commit
    pub async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.control_statement(Statement::auto_commit(enabled), "set auto-commit")
            .await?;
        self.shared().auto_commit = enabled;
        Ok(())
    }

    /// Start a transaction (suspends auto-commit until commit or rollback)
    pub async fn begin(&self) -> Result<()> {
        self.execute("START TRANSACTION").await.map(drop)
    }

    /// Commit the current transaction
    pub async fn commit(&self) -> Result<()> {
        self.execute("COMMIT").await.map(drop)
    }

    /// Rollback the current transaction
    pub async fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK").await.map(drop)
    }

    /// Create a savepoint within the current transaction
    ///
    /// # Example
    /// ```rust,no_run
    /// # use monetdb_rs::Connection;
    /// # async fn example(conn: Connection) -> monetdb_rs::Result<()> {
    /// conn.begin().await?;
    /// conn.execute("INSERT INTO t VALUES (1)").await?;
    /// conn.savepoint("sp1").await?;
    /// conn.execute("INSERT INTO t VALUES (2)").await?;
    /// conn.rollback_to_savepoint("sp1").await?; // undoes the second insert
    /// conn.commit().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn savepoint(&self, name: &str) -> Result<()> {
        let sql = format!("SAVEPOINT {}", quote_identifier(name)?);
        self.execute(&sql).await.map(drop)
    }

    /// Release a savepoint
    pub async fn release_savepoint(&self, name: &str) -> Result<()> {
        let sql = format!("RELEASE SAVEPOINT {}", quote_identifier(name)?);
        self.execute(&sql).await.map(drop)
    }

    /// Rollback to a previously created savepoint
    pub async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name)?);
        self.execute(&sql).await.map(drop)
    }

    /// Close the connection
    ///
    /// Safe to call more than once. Waits for an in-flight command to finish.
    pub async fn close(&self) -> Result<()> {
        let mut io = self.io.lock().await;
        {
            let mut shared = self.shared();
            if shared.session.state() == SessionState::Disconnected && io.transport.is_none() {
                return Ok(());
            }
            shared.session.close();
        }
        io.shutdown_transport().await;
        tracing::debug!(conn_id = self.id, "connection closed");
        Ok(())
    }

    fn shared(&self) -> StdMutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the connection for one command
    ///
    /// Fails fast with `Busy` if a command is in flight. A session still
    /// marked `Busy` while the lock is free belongs to an abandoned command
    /// and fails the connection.
    fn claim(
        &self,
        operation: &'static str,
        result: Option<&ResultSet>,
    ) -> Result<(MutexGuard<'_, Io>, u64)> {
        let mut io = self.io.try_lock().map_err(|_| Error::Busy)?;
        let mut shared = self.shared();

        if shared.session.state() == SessionState::Busy {
            tracing::warn!(conn_id = self.id, "previous command was abandoned, failing connection");
            shared.session.fail();
            io.transport = None;
        }

        if let Some(rs) = result {
            if rs.connection_id != self.id || rs.generation != shared.session.generation() {
                return Err(Error::ResultSetInvalidated {
                    query_id: rs.query_id(),
                });
            }
        }

        let generation = shared.session.begin_command(operation)?;
        drop(shared);
        Ok((io, generation))
    }

    /// Record the outcome of a command started with `claim`
    fn finish<T>(&self, io: &mut Io, result: &Result<T>) {
        self.shared().session.finish_command(result);
        if let Err(e) = result {
            if e.is_fatal() {
                tracing::warn!(conn_id = self.id, error = %e, "command failed, connection unusable");
                io.transport = None;
            } else {
                tracing::debug!(conn_id = self.id, error = %e, "command failed");
            }
        }
    }

    async fn control_statement(&self, statement: Statement, operation: &'static str) -> Result<()> {
        let (mut io, _) = self.claim(operation, None)?;
        tracing::trace!(conn_id = self.id, command = statement.text(), "control command");

        let result = async {
            let frame = io.round_trip(&statement).await?;
            ResultDecoder::decode(&frame).map(drop)
        }
        .await;
        self.finish(&mut io, &result);
        result
    }

    async fn open_locked(&self, io: &mut Io) -> Result<()> {
        let state = self.state();
        if state != SessionState::Disconnected {
            return Err(Error::InvalidState {
                state,
                operation: "connect",
            });
        }

        let credentials = io.config.take_credentials()?;
        let auth_timeout = io.config.auth_timeout;

        let result = match timeout(auth_timeout, self.handshake(&mut io.config, &credentials)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: "authentication",
                duration: auth_timeout,
            }),
        };
        drop(credentials);

        match result {
            Ok((mut transport, server_info)) => {
                transport.set_receive_timeout(io.config.receive_timeout);
                io.transport = Some(transport);

                let mut shared = self.shared();
                shared.session.transition(SessionState::Ready, "authenticate")?;
                tracing::info!(
                    conn_id = self.id,
                    host = %server_info.host,
                    port = server_info.port,
                    database = %server_info.database,
                    hash = ?server_info.hash_algorithm,
                    "connected"
                );
                shared.server_info = server_info;
                shared.auto_commit = io.config.auto_commit;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(conn_id = self.id, error = %e, "connect failed");
                self.shared().session.fail();
                Err(e)
            }
        }
    }

    /// Open the transport and log in, following at most `MAX_REDIRECTS` redirects
    async fn handshake(
        &self,
        config: &mut Config,
        credentials: &Credentials,
    ) -> Result<(Box<dyn Transport>, ServerInfo)> {
        let mut redirects = 0;
        let tls = config
            .is_tls_enabled()
            .then(|| config.tls_config.clone().unwrap_or_default());

        'connect: loop {
            self.shared()
                .session
                .transition(SessionState::Connecting, "connect")?;
            tracing::debug!(conn_id = self.id, host = %config.host, port = config.port, "opening transport");

            let mut transport: Box<dyn Transport> = Box::new(
                transport::connect(&config.host, config.port, config.connect_timeout, tls.as_ref())
                    .await?
                    .with_max_message_size(config.max_message_size),
            );
            self.shared()
                .session
                .transition(SessionState::Authenticating, "authenticate")?;

            loop {
                let frame = transport.receive().await?;
                let challenge = Challenge::parse(frame.text()?)?;
                tracing::debug!(
                    conn_id = self.id,
                    server_type = %challenge.server_type,
                    hashes = ?challenge.hash_algorithms,
                    "received challenge"
                );

                let auth = AuthMessage::build(
                    &challenge,
                    credentials,
                    &config.language,
                    &config.database,
                    config.hash_algorithm,
                )?;
                transport.send(auth.as_bytes()).await?;

                let reply = transport.receive().await?;
                let target = match AuthReply::parse(reply.text()?)? {
                    AuthReply::Ok => {
                        apply_session_options(transport.as_mut(), config).await?;
                        let server_info = ServerInfo {
                            server_type: challenge.server_type,
                            protocol: challenge.protocol,
                            hash_algorithm: Some(auth.algorithm),
                            password_hash: Some(challenge.password_hash),
                            endianness: challenge.endianness,
                            host: config.host.clone(),
                            port: config.port,
                            database: config.database.clone(),
                            redirects,
                        };
                        return Ok((transport, server_info));
                    }
                    AuthReply::Failed(message) => {
                        return Err(classify_failure(&message, &config.database));
                    }
                    AuthReply::Redirect(target) => target,
                };

                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    transport.close().await.ok();
                    return Err(Error::TooManyRedirects(target.to_string()));
                }
                tracing::warn!(conn_id = self.id, target = %target, "following redirect");

                match target {
                    RedirectTarget::Proxy { database } => {
                        if let Some(db) = database {
                            config.database = db;
                        }
                    }
                    RedirectTarget::Server {
                        host,
                        port,
                        database,
                    } => {
                        transport.close().await.ok();
                        config.redirect_to(&host, port, database.as_deref());
                        continue 'connect;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Send the per-session settings right after login
async fn apply_session_options(transport: &mut dyn Transport, config: &Config) -> Result<()> {
    let mut statements = vec![
        Statement::reply_size(config.reply_size),
        Statement::size_header(true),
    ];
    if !config.auto_commit {
        statements.push(Statement::auto_commit(false));
    }

    for statement in statements {
        transport.send(&statement.encode()).await?;
        let frame = transport.receive().await?;
        ResultDecoder::decode(&frame)?;
    }
    Ok(())
}

/// Quote a savepoint name as a SQL identifier
fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidConfig("empty savepoint name".to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("sp1").unwrap(), "\"sp1\"");
        assert_eq!(quote_identifier("a\"b").unwrap(), "\"a\"\"b\"");
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn test_new_connection_is_disconnected() {
        let conn = Connection::new(Config::new("localhost", 50000, "demo", "u", "p"));
        assert_eq!(conn.state(), SessionState::Disconnected);
        assert!(!conn.is_alive());
        assert!(conn.server_info().host.is_empty());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = Connection::new(Config::default());
        let b = Connection::new(Config::default());
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_execute_before_connect() {
        let conn = Connection::new(Config::default());
        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Disconnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transaction_and_fetch_before_connect() {
        let conn = Connection::new(Config::default());
        let err = conn.begin().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Disconnected,
                ..
            }
        ));
        assert!(matches!(
            conn.set_reply_size(10).await,
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(conn.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = Connection::new(Config::default());
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_open_without_password() {
        let conn = Connection::new(Config::default());
        let err = conn.open().await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(conn.state(), SessionState::Disconnected);
    }
}
