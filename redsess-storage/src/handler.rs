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

//! The session handler surface: open / read / write / destroy / close / gc.
//!
//! One handler instance serves one request worker and is never shared.
//! `read` runs the lock engine and decodes the payload; `write` re-checks
//! ownership and commits with the policy TTL; `destroy` unlinks the
//! record. The `write`-family operations return `bool` because the host
//! framework contract swallows driver failures; only `read` propagates
//! errors (admission rejection becomes the caller's HTTP 503).

use redsess_core::{RedSessError, RequestContext, Result, SessionConfig};

use crate::bot::BotClassifier;
use crate::codec::Codec;
use crate::lifetime::LifetimePolicy;
use crate::lock::{self, LockSettings};
use crate::pid;
use crate::store::{
    RecordStore, RedisStore, StoreOp, FIELD_DATA, FIELD_LOCK, FIELD_PID, FIELD_REQ, FIELD_WAIT,
    FIELD_WRITES,
};

pub const SESSION_PREFIX: &str = "sess_";

/// Placeholder TTL applied on lock acquisition so partial state cannot
/// leak indefinitely; the policy TTL replaces it at commit.
const LOCK_GRACE_SECONDS: i64 = 6 * 3600;

pub fn session_key(id: &str) -> String {
    format!("{SESSION_PREFIX}{id}")
}

pub struct SessionHandler {
    store: Box<dyn RecordStore>,
    config: SessionConfig,
    codec: Codec,
    classifier: BotClassifier,
    policy: LifetimePolicy,
    locking: LockSettings,
    identity: String,
    context: RequestContext,

    read_only: bool,
    has_lock: bool,
    session_written: bool,
    life_time: Option<u64>,
    session_writes: i64,
    failed_lock_attempts: u32,
}

impl SessionHandler {
    /// Connect to Redis (direct or sentinel-resolved) and build a handler.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let store = RedisStore::connect(&config)?;
        Ok(Self::with_store(Box::new(store), config))
    }

    /// Build a handler over an already-established record store.
    pub fn with_store(store: Box<dyn RecordStore>, config: SessionConfig) -> Self {
        Self {
            codec: Codec::new(config.compression_library, config.compression_threshold),
            classifier: BotClassifier::new(),
            policy: LifetimePolicy::from_config(&config),
            locking: LockSettings::from_config(&config),
            identity: pid::identity(),
            context: RequestContext::from_env(),
            store,
            config,
            read_only: false,
            has_lock: false,
            session_written: false,
            life_time: None,
            session_writes: 0,
            failed_lock_attempts: 0,
        }
    }

    /// Install a bot-classification override consulted after the regex.
    pub fn with_bot_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        self.classifier = BotClassifier::with_override(f);
        self
    }

    /// Replace the request context (defaults to the process environment).
    pub fn with_request_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Ticks spent in the last lock acquisition loop.
    pub fn failed_lock_attempts(&self) -> u32 {
        self.failed_lock_attempts
    }

    pub fn has_lock(&self) -> bool {
        self.has_lock
    }

    pub fn open(&mut self, _save_path: &str, _session_name: &str) -> bool {
        true
    }

    /// Fetch the session payload, acquiring the advisory lock first unless
    /// the handler is read-only or locking is disabled.
    pub fn read(&mut self, id: &str) -> Result<Vec<u8>> {
        let key = session_key(id);
        self.has_lock = false;
        let mut lock_count: i64 = 0;
        let mut tries: u32 = 0;

        if self.locking.use_locking && !self.read_only {
            match lock::acquire(self.store.as_mut(), &key, &self.locking) {
                Ok(acq) => {
                    self.has_lock = acq.has_lock;
                    lock_count = acq.lock_count;
                    tries = acq.tries;
                }
                Err(e @ RedSessError::ConcurrentConnectionsExceeded) => {
                    // Keep the rejected request from committing anything.
                    self.session_written = true;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        self.failed_lock_attempts = tries;

        let values = self.store.hmget(&key, &[FIELD_DATA, FIELD_WRITES])?;
        let data = values.first().cloned().flatten();
        self.session_writes = values
            .get(1)
            .and_then(|v| v.as_deref())
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        // Any tick spent looping means we registered as a waiter.
        if tries > 0 {
            self.store.hincrby(&key, FIELD_WAIT, -1)?;
        }

        let mut ops = vec![StoreOp::Select(self.config.database)];
        if self.has_lock {
            if lock_count > 1 {
                let previous = self
                    .store
                    .hget(&key, FIELD_REQ)?
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                tracing::info!(
                    session = %key,
                    lock = lock_count,
                    tries,
                    previous_request = %previous,
                    "broke lock"
                );
            }
            ops.push(StoreOp::HMSet {
                key: key.clone(),
                fields: vec![
                    (FIELD_PID, self.identity.clone().into_bytes()),
                    // Restore the single-owner invariant even after a break.
                    (FIELD_LOCK, b"1".to_vec()),
                    (FIELD_REQ, self.context.describe().into_bytes()),
                ],
            });
        }
        ops.push(StoreOp::Expire {
            key: key.clone(),
            seconds: LOCK_GRACE_SECONDS,
        });
        self.store.exec(ops)?;

        self.session_written = false;

        match data {
            Some(bytes) if !bytes.is_empty() => self.codec.decode(&bytes),
            _ => Ok(Vec::new()),
        }
    }

    /// Commit the session payload. At most one effective write happens per
    /// handler instance; repeated calls and read-only handlers succeed
    /// without touching the store.
    pub fn write(&mut self, id: &str, data: &[u8]) -> bool {
        if self.session_written {
            tracing::debug!(session_id = id, "session already written; skipping");
            return true;
        }
        if self.read_only {
            tracing::debug!(session_id = id, "handler is read-only; skipping write");
            return true;
        }
        self.session_written = true;

        let key = session_key(id);
        match self.try_write(&key, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session = %key, error = %e, "session write failed");
                false
            }
        }
    }

    fn try_write(&mut self, key: &str, data: &[u8]) -> Result<()> {
        if self.locking.use_locking
            && lock::owned_elsewhere(self.store.as_mut(), key, &self.identity)?
        {
            if self.has_lock {
                tracing::warn!(
                    session = %key,
                    attempts = self.failed_lock_attempts,
                    "not writing session: another process took the lock"
                );
            } else {
                tracing::warn!(
                    session = %key,
                    attempts = self.failed_lock_attempts,
                    "not writing session: unable to acquire lock"
                );
            }
            return Ok(());
        }

        let life_time = self.life_time();
        let encoded = self.codec.encode(data);
        self.store.exec(vec![
            StoreOp::Select(self.config.database),
            StoreOp::HMSet {
                key: key.to_string(),
                fields: vec![(FIELD_DATA, encoded), (FIELD_LOCK, b"0".to_vec())],
            },
            StoreOp::HIncrBy {
                key: key.to_string(),
                field: FIELD_WRITES,
                delta: 1,
            },
            StoreOp::Expire {
                key: key.to_string(),
                seconds: life_time.min(self.config.max_lifetime) as i64,
            },
        ])
    }

    /// Session lifetime for this request, computed once per handler.
    fn life_time(&mut self) -> u64 {
        if let Some(cached) = self.life_time {
            return cached;
        }
        let life = self
            .policy
            .compute(self.session_writes, self.context.user_agent(), &self.classifier);
        self.life_time = Some(life);
        life
    }

    pub fn destroy(&mut self, id: &str) -> bool {
        let key = session_key(id);
        tracing::debug!(session = %key, "destroying session");
        let ops = vec![
            StoreOp::Select(self.config.database),
            StoreOp::Unlink { key },
        ];
        if let Err(e) = self.store.exec(ops) {
            tracing::error!(session_id = id, error = %e, "session destroy failed");
        }
        true
    }

    /// Release the driver connection. Safe to call repeatedly and after
    /// `destroy`.
    pub fn close(&mut self) -> bool {
        tracing::debug!("Closing connection");
        if let Err(e) = self.store.close() {
            tracing::warn!(error = %e, "error while closing connection");
        }
        true
    }

    /// Expired records are reclaimed by the store's native TTLs.
    pub fn gc(&mut self, _max_lifetime: u64) -> bool {
        true
    }
}
