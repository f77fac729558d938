//! Instance Session: a pooled, authenticated connection to one MySQL server.
//!
//! Grounded on `client.rs`'s `EnterpriseClient` (builder, typed request
//! helpers, error mapping). The wire protocol itself is out of scope
//! (spec.md §1) — `SqlTransport` is the contract a real driver fulfills;
//! `MysqlInstanceSession` is a thin adapter over the `mysql_async` crate.

use crate::error::{AdminError, Result};
use crate::types::{Endpoint, ServerVersion};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// One row of a query result, keyed by column name. Kept untyped because
/// every caller already knows its own column set; this mirrors the
/// teacher's use of `serde_json::Value` for passthrough/dynamic-shape
/// responses (`stats.rs`, `cluster.rs`'s `extra` fields).
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The out-of-scope "MySQL wire client" contract (spec.md §1, §6).
///
/// A real implementation speaks the MySQL protocol; this crate never
/// does. Tests substitute `MockTransport`.
#[async_trait]
pub trait SqlTransport: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn SqlConnection>>;
}

/// A single open connection, analogous to `reqwest::Client`'s per-request
/// handle in the teacher.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;
    async fn execute(&mut self, sql: &str) -> Result<u64>;
    async fn is_alive(&mut self) -> bool;
}

/// Builder for [`InstanceSession`], mirroring `EnterpriseClientBuilder`.
#[derive(Clone)]
pub struct InstanceSessionBuilder {
    endpoint: Endpoint,
    username: String,
    password: String,
    timeout: Duration,
    transport: Arc<dyn SqlTransport>,
}

impl InstanceSessionBuilder {
    pub fn new(endpoint: Endpoint, transport: Arc<dyn SqlTransport>) -> Self {
        Self {
            endpoint,
            username: "root".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(30),
            transport,
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn build(self) -> Result<InstanceSession> {
        let conn = self.transport.connect(&self.endpoint).await?;
        Ok(InstanceSession {
            endpoint: self.endpoint,
            username: self.username,
            password: self.password,
            timeout: self.timeout,
            transport: self.transport,
            conn: tokio::sync::Mutex::new(conn),
        })
    }
}

/// A pooled, authenticated connection to one MySQL server.
///
/// Exposes the typed query surface named in spec.md §2 (`get_sysvar`,
/// `set_sysvar`, `query`, `execute`) plus a reconnect-if-lost helper.
pub struct InstanceSession {
    endpoint: Endpoint,
    username: String,
    password: String,
    timeout: Duration,
    transport: Arc<dyn SqlTransport>,
    conn: tokio::sync::Mutex<Box<dyn SqlConnection>>,
}

impl InstanceSession {
    pub fn builder(endpoint: Endpoint, transport: Arc<dyn SqlTransport>) -> InstanceSessionBuilder {
        InstanceSessionBuilder::new(endpoint, transport)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run a query, reconnecting once on a lost-connection class error
    /// (spec.md §7: `CR_SERVER_LOST`, `CR_SERVER_GONE_ERROR`).
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        trace!(target: "session", "query {}: {}", self.endpoint, sql);
        let mut guard = self.conn.lock().await;
        match guard.query(sql).await {
            Ok(rows) => Ok(rows),
            Err(e) if e.is_reconnectable() => {
                warn!(target: "session", "connection lost to {}, reconnecting once", self.endpoint);
                *guard = self.transport.connect(&self.endpoint).await?;
                guard.query(sql).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(target: "session", "execute {}: {}", self.endpoint, sql);
        let mut guard = self.conn.lock().await;
        match guard.execute(sql).await {
            Ok(n) => Ok(n),
            Err(e) if e.is_reconnectable() => {
                warn!(target: "session", "connection lost to {}, reconnecting once", self.endpoint);
                *guard = self.transport.connect(&self.endpoint).await?;
                guard.execute(sql).await
            }
            Err(e) => Err(e),
        }
    }

    /// `SELECT @@GLOBAL.<name>`
    pub async fn get_sysvar(&self, name: &str) -> Result<String> {
        let rows = self.query(&format!("SELECT @@GLOBAL.{name} AS v")).await?;
        let row = rows
            .first()
            .ok_or_else(|| AdminError::Other(format!("sysvar {name} not found")))?;
        row.get("v")
            .and_then(|v| v.as_str().map(str::to_owned).or_else(|| Some(v.to_string())))
            .ok_or_else(|| AdminError::Other(format!("sysvar {name} has no value")))
    }

    /// `SET { PERSIST | PERSIST_ONLY | GLOBAL } <name> = <value>`
    pub async fn set_sysvar(&self, name: &str, value: &str, persist: SysvarPersistence) -> Result<()> {
        let clause = match persist {
            SysvarPersistence::Session => "GLOBAL",
            SysvarPersistence::Persist => "PERSIST",
            SysvarPersistence::PersistOnly => "PERSIST_ONLY",
        };
        self.execute(&format!("SET {clause} {name} = {value}")).await?;
        Ok(())
    }

    pub async fn query_one<T: DeserializeOwned>(&self, sql: &str) -> Result<Option<T>> {
        let rows = self.query(sql).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(serde_json::Value::Object(row))?)),
            None => Ok(None),
        }
    }

    pub async fn is_alive(&self) -> bool {
        self.conn.lock().await.is_alive().await
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(e: serde_json::Error) -> Self {
        AdminError::Other(format!("deserialization error: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysvarPersistence {
    Session,
    Persist,
    PersistOnly,
}

/// Parse a `SELECT VERSION()`-style string into a [`ServerVersion`].
pub fn parse_server_version(raw: &str) -> Result<ServerVersion> {
    let core = raw.split(['-', '+']).next().unwrap_or(raw);
    let mut parts = core.split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| AdminError::Other(format!("cannot parse version '{raw}'")))?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Ok(ServerVersion::new(major, minor, patch))
}
