// SPDX-License-Identifier: AGPL-3.0-or-later
// RedSess - Redis-Backed Session Storage
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Record store abstraction over the session hash records.
//!
//! The lock engine and the session handler only ever touch a handful of
//! hash primitives plus an atomic pipeline, captured here as the
//! `RecordStore` trait. Two implementations ship:
//!
//! - `RedisStore`: the real driver (direct or sentinel-resolved master)
//! - `MemoryStore`: a thread-safe in-memory store for tests and embedding
//!
//! Counter fields are signed on purpose: zombie-waiter correction relies
//! on `wait` transiently dropping below zero.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use redis::Connection;

use redsess_core::{RedSessError, Result, SessionConfig};

pub const FIELD_DATA: &str = "data";
pub const FIELD_LOCK: &str = "lock";
pub const FIELD_PID: &str = "pid";
pub const FIELD_WAIT: &str = "wait";
pub const FIELD_WRITES: &str = "writes";
pub const FIELD_REQ: &str = "req";

/// One step of an atomic pipeline against the record store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Select(i64),
    HSet {
        key: String,
        field: &'static str,
        value: Vec<u8>,
    },
    HMSet {
        key: String,
        fields: Vec<(&'static str, Vec<u8>)>,
    },
    HIncrBy {
        key: String,
        field: &'static str,
        delta: i64,
    },
    Expire {
        key: String,
        seconds: i64,
    },
    Unlink {
        key: String,
    },
}

/// The interface the session core consumes from its key-value driver.
pub trait RecordStore: Send {
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64>;
    fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;
    fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>>;
    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()>;
    /// Apply a batch of operations in one round trip.
    fn exec(&mut self, ops: Vec<StoreOp>) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Redis driver
// ============================================================================

pub struct RedisStore {
    conn: Option<Connection>,
}

impl RedisStore {
    /// Establish a connection per the configured topology. Returns
    /// `ConnectionFailed` carrying the last underlying cause when nothing
    /// works.
    pub fn connect(cfg: &SessionConfig) -> Result<Self> {
        let conn = if cfg.sentinel.servers.is_empty() {
            Self::connect_direct(cfg)
                .map_err(|e| RedSessError::ConnectionFailed(Box::new(e)))?
        } else {
            Self::connect_sentinel(cfg)?
        };
        Ok(Self { conn: Some(conn) })
    }

    fn open(host: &str, port: u16, timeout: Duration) -> Result<Connection> {
        let url = if host.starts_with('/') {
            format!("redis+unix://{host}")
        } else {
            format!("redis://{host}:{port}")
        };
        let client = redis::Client::open(url.as_str())?;
        let conn = client.get_connection()?;
        if !timeout.is_zero() {
            conn.set_read_timeout(Some(timeout))?;
            conn.set_write_timeout(Some(timeout))?;
        }
        Ok(conn)
    }

    fn connect_direct(cfg: &SessionConfig) -> Result<Connection> {
        let mut conn = Self::open(&cfg.host, cfg.port, cfg.timeout_duration())?;
        if let Some(password) = &cfg.password {
            redis::cmd("AUTH").arg(password).query::<()>(&mut conn)?;
        }
        if cfg.database != 0 {
            redis::cmd("SELECT").arg(cfg.database).query::<()>(&mut conn)?;
        }
        Ok(conn)
    }

    fn connect_sentinel(cfg: &SessionConfig) -> Result<Connection> {
        let sentinel = &cfg.sentinel;
        let mut last_err = RedSessError::Config("no sentinel servers configured".into());
        for pass in 0..=sentinel.connect_retries {
            for server in &sentinel.servers {
                match Self::try_sentinel(cfg, server) {
                    Ok(conn) => {
                        tracing::debug!(sentinel = %server, pass, "resolved master via sentinel");
                        return Ok(conn);
                    }
                    Err(e) => {
                        tracing::debug!(sentinel = %server, pass, error = %e,
                            "sentinel endpoint failed");
                        last_err = e;
                    }
                }
            }
        }
        Err(RedSessError::ConnectionFailed(Box::new(last_err)))
    }

    fn try_sentinel(cfg: &SessionConfig, server: &str) -> Result<Connection> {
        let timeout = cfg.timeout_duration();
        let (host, port) = split_host_port(server);
        let mut sentinel = Self::open(host, port, timeout)?;

        if let Some(password) = &cfg.sentinel.password {
            if let Err(e) = redis::cmd("AUTH").arg(password).query::<()>(&mut sentinel) {
                if !is_no_password_error(&e) {
                    return Err(e.into());
                }
            }
        }

        let addr: Vec<String> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(&cfg.sentinel.master)
            .query(&mut sentinel)?;
        let [master_host, master_port] = addr.as_slice() else {
            return Err(RedSessError::Config(format!(
                "sentinel did not resolve master group '{}'",
                cfg.sentinel.master
            )));
        };
        let master_port: u16 = master_port.parse().map_err(|_| {
            RedSessError::Config(format!("sentinel returned invalid port '{master_port}'"))
        })?;

        let mut master = Self::open(master_host, master_port, timeout)?;
        if let Some(password) = &cfg.password {
            redis::cmd("AUTH").arg(password).query::<()>(&mut master)?;
        }

        if cfg.sentinel.verify_master && !Self::is_master(&mut master)? {
            std::thread::sleep(Duration::from_millis(100));
            if !Self::is_master(&mut master)? {
                return Err(RedSessError::Config(format!(
                    "node resolved for '{}' does not report the master role",
                    cfg.sentinel.master
                )));
            }
        }

        if cfg.database != 0 {
            redis::cmd("SELECT").arg(cfg.database).query::<()>(&mut master)?;
        }
        Ok(master)
    }

    fn is_master(conn: &mut Connection) -> Result<bool> {
        let role = redis::cmd("ROLE").query::<redis::Value>(conn)?;
        if let redis::Value::Array(items) = role {
            if let Some(redis::Value::BulkString(kind)) = items.first() {
                return Ok(kind.as_slice() == b"master");
            }
        }
        Ok(false)
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(RedSessError::NotConnected)
    }
}

/// Redis replies with one of two messages when AUTH is sent to an instance
/// that has no password configured; both mean "carry on".
fn is_no_password_error(err: &redis::RedisError) -> bool {
    let msg = err.to_string();
    msg.contains("no password is set") || msg.contains("without any password configured")
}

fn split_host_port(server: &str) -> (&str, u16) {
    let server = server
        .trim()
        .trim_start_matches("tcp://")
        .trim_start_matches("redis://");
    match server.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (server, redsess_core::config::DEFAULT_SENTINEL_PORT),
        },
        None => (server, redsess_core::config::DEFAULT_SENTINEL_PORT),
    }
}

impl RecordStore for RedisStore {
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        Ok(redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query(self.conn()?)?)
    }

    fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        Ok(redis::cmd("HGET").arg(key).arg(field).query(self.conn()?)?)
    }

    fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        Ok(redis::cmd("HMGET").arg(key).arg(fields).query(self.conn()?)?)
    }

    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query::<()>(self.conn()?)?;
        Ok(())
    }

    fn exec(&mut self, ops: Vec<StoreOp>) -> Result<()> {
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                StoreOp::Select(db) => pipe.cmd("SELECT").arg(*db).ignore(),
                StoreOp::HSet { key, field, value } => {
                    pipe.cmd("HSET").arg(key).arg(*field).arg(value).ignore()
                }
                StoreOp::HMSet { key, fields } => {
                    let cmd = pipe.cmd("HSET").arg(key);
                    for (field, value) in fields {
                        cmd.arg(*field).arg(value);
                    }
                    cmd.ignore()
                }
                StoreOp::HIncrBy { key, field, delta } => {
                    pipe.cmd("HINCRBY").arg(key).arg(*field).arg(*delta).ignore()
                }
                StoreOp::Expire { key, seconds } => {
                    pipe.cmd("EXPIRE").arg(key).arg(*seconds).ignore()
                }
                StoreOp::Unlink { key } => pipe.cmd("UNLINK").arg(key).ignore(),
            };
        }
        pipe.query::<()>(self.conn()?)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the connection closes the socket; repeated closes are
        // no-ops.
        self.conn = None;
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryRecord {
    fields: HashMap<String, Vec<u8>>,
    ttl: Option<i64>,
}

/// Thread-safe in-memory record store. Clones share state, so concurrent
/// handlers in one process coordinate exactly as they would through Redis.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, MemoryRecord>>>,
}

fn parse_counter(bytes: Option<&Vec<u8>>) -> i64 {
    bytes
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a record field, for inspection.
    pub fn field(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(key)?.fields.get(field).cloned()
    }

    /// Field parsed as a signed counter (0 when absent).
    pub fn counter(&self, key: &str, field: &str) -> i64 {
        self.inner
            .lock()
            .get(key)
            .map(|r| parse_counter(r.fields.get(field)))
            .unwrap_or(0)
    }

    /// Last TTL applied to a record, in seconds.
    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.inner.lock().get(key)?.ttl
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Set a field directly, bypassing the trait. Used to stage records.
    pub fn put_field(&self, key: &str, field: &str, value: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock();
        let record = inner.entry(key.to_string()).or_default();
        record.fields.insert(field.to_string(), value.into());
    }
}

impl RecordStore for MemoryStore {
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut inner = self.inner.lock();
        let record = inner.entry(key.to_string()).or_default();
        let next = parse_counter(record.fields.get(field)) + delta;
        record
            .fields
            .insert(field.to_string(), next.to_string().into_bytes());
        Ok(next)
    }

    fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.field(key, field))
    }

    fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let inner = self.inner.lock();
        let record = inner.get(key);
        Ok(fields
            .iter()
            .map(|f| record.and_then(|r| r.fields.get(*f).cloned()))
            .collect())
    }

    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        self.put_field(key, field, value.to_vec());
        Ok(())
    }

    fn exec(&mut self, ops: Vec<StoreOp>) -> Result<()> {
        // One guard for the whole batch keeps it atomic.
        let mut inner = self.inner.lock();
        for op in ops {
            match op {
                StoreOp::Select(_) => {}
                StoreOp::HSet { key, field, value } => {
                    inner
                        .entry(key)
                        .or_default()
                        .fields
                        .insert(field.to_string(), value);
                }
                StoreOp::HMSet { key, fields } => {
                    let record = inner.entry(key).or_default();
                    for (field, value) in fields {
                        record.fields.insert(field.to_string(), value);
                    }
                }
                StoreOp::HIncrBy { key, field, delta } => {
                    let record = inner.entry(key).or_default();
                    let next = parse_counter(record.fields.get(field)) + delta;
                    record
                        .fields
                        .insert(field.to_string(), next.to_string().into_bytes());
                }
                StoreOp::Expire { key, seconds } => {
                    if let Some(record) = inner.get_mut(&key) {
                        record.ttl = Some(seconds);
                    }
                }
                StoreOp::Unlink { key } => {
                    inner.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hincrby_creates_and_counts() {
        let mut store = MemoryStore::new();
        assert_eq!(store.hincrby("sess_a", FIELD_LOCK, 1).unwrap(), 1);
        assert_eq!(store.hincrby("sess_a", FIELD_LOCK, 1).unwrap(), 2);
        assert_eq!(store.hincrby("sess_a", FIELD_WAIT, -1).unwrap(), -1);
    }

    #[test]
    fn counters_may_go_negative() {
        let mut store = MemoryStore::new();
        store.hincrby("sess_a", FIELD_WAIT, -3).unwrap();
        assert_eq!(store.counter("sess_a", FIELD_WAIT), -3);
    }

    #[test]
    fn exec_applies_every_op() {
        let mut store = MemoryStore::new();
        store
            .exec(vec![
                StoreOp::Select(0),
                StoreOp::HMSet {
                    key: "sess_a".into(),
                    fields: vec![
                        (FIELD_DATA, b"payload".to_vec()),
                        (FIELD_LOCK, b"0".to_vec()),
                    ],
                },
                StoreOp::HIncrBy {
                    key: "sess_a".into(),
                    field: FIELD_WRITES,
                    delta: 1,
                },
                StoreOp::Expire {
                    key: "sess_a".into(),
                    seconds: 600,
                },
            ])
            .unwrap();
        assert_eq!(store.field("sess_a", FIELD_DATA).unwrap(), b"payload");
        assert_eq!(store.counter("sess_a", FIELD_WRITES), 1);
        assert_eq!(store.ttl("sess_a"), Some(600));

        store
            .exec(vec![StoreOp::Unlink {
                key: "sess_a".into(),
            }])
            .unwrap();
        assert!(!store.contains("sess_a"));
    }

    #[test]
    fn clones_share_state() {
        let a = MemoryStore::new();
        let mut b = a.clone();
        b.hset("sess_a", FIELD_PID, b"host|1").unwrap();
        assert_eq!(a.field("sess_a", FIELD_PID).unwrap(), b"host|1");
    }

    #[test]
    fn sentinel_server_parsing() {
        assert_eq!(split_host_port("10.0.0.1:26380"), ("10.0.0.1", 26380));
        assert_eq!(split_host_port("tcp://sentinel-a"), ("sentinel-a", 26379));
        assert_eq!(
            split_host_port("redis://sentinel-b:26381"),
            ("sentinel-b", 26381)
        );
    }
}
