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

//! Session handler configuration
//!
//! All tunables consumed by the storage engine, with defaults matching the
//! documented behavior. Host config providers can hydrate `SessionConfig`
//! from any serde-compatible source; absent fields fall back to defaults.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RedSessError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;
pub const DEFAULT_TIMEOUT: f64 = 2.5;
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 2048;
pub const DEFAULT_MAX_CONCURRENCY: i64 = 6;
pub const DEFAULT_LIFETIME: u64 = 1440;
pub const DEFAULT_MAX_LIFETIME: u64 = 2_592_000;
pub const DEFAULT_MIN_LIFETIME: u64 = 60;
pub const DEFAULT_BOT_LIFETIME: u64 = 7200;
pub const DEFAULT_BOT_FIRST_LIFETIME: u64 = 60;
pub const DEFAULT_FIRST_LIFETIME: u64 = 600;
pub const DEFAULT_BREAK_AFTER: f64 = 30.0;
pub const DEFAULT_FAIL_AFTER: f64 = 15.0;
pub const DEFAULT_ZOMBIE_INTERVAL_TICKS: u32 = 20;
pub const DEFAULT_SENTINEL_RETRIES: u32 = 5;

/// Compression algorithm applied to session payloads at or above the
/// configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLibrary {
    None,
    #[default]
    Gzip,
    Lzf,
    Lz4,
    Snappy,
}

impl CompressionLibrary {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLibrary::None => "none",
            CompressionLibrary::Gzip => "gzip",
            CompressionLibrary::Lzf => "lzf",
            CompressionLibrary::Lz4 => "lz4",
            CompressionLibrary::Snappy => "snappy",
        }
    }
}

impl FromStr for CompressionLibrary {
    type Err = RedSessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Empty means "use default", matching every other knob.
            "" => Ok(CompressionLibrary::default()),
            "none" => Ok(CompressionLibrary::None),
            "gzip" => Ok(CompressionLibrary::Gzip),
            "lzf" => Ok(CompressionLibrary::Lzf),
            "lz4" => Ok(CompressionLibrary::Lz4),
            "snappy" => Ok(CompressionLibrary::Snappy),
            other => Err(RedSessError::Config(format!(
                "unknown compression library: {other}"
            ))),
        }
    }
}

/// Sentinel topology used to resolve the master at construction time.
///
/// An empty `servers` list disables sentinel resolution entirely and the
/// handler direct-connects to `host:port`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Sentinel endpoints, `host` or `host:port` (default port 26379).
    pub servers: Vec<String>,
    /// Master group name to resolve.
    pub master: String,
    /// Verify the resolved node reports `ROLE master` before using it.
    pub verify_master: bool,
    /// Extra round-robin passes over `servers` before giving up.
    pub connect_retries: u32,
    /// Password for the sentinel endpoints themselves (the resolved master
    /// is authenticated with the main `password`).
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Redis host, or a unix socket path when it starts with `/`.
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    /// Read/write timeout in seconds for the driver connection.
    pub timeout: f64,

    /// Payloads at or above this many bytes are compressed; 0 disables
    /// compression outright.
    pub compression_threshold: usize,
    pub compression_library: CompressionLibrary,

    /// Ceiling on simultaneous lock waiters per session.
    pub max_concurrency: i64,

    /// Steady-state session lifetime in seconds.
    pub lifetime: u64,
    pub max_lifetime: u64,
    pub min_lifetime: u64,
    pub bot_lifetime: u64,
    pub bot_first_lifetime: u64,
    pub first_lifetime: u64,

    /// Skip the locking protocol entirely; writes behave as if the lock
    /// were always held.
    pub disable_locking: bool,
    /// Seconds a contender waits before it is entitled to steal the lock.
    pub break_after: f64,
    /// Additional seconds past `break_after` before giving up read-only.
    pub fail_after: f64,
    /// Zombie detection cadence in lock-loop ticks.
    pub zombie_interval_ticks: u32,

    pub sentinel: SentinelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: 0,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_library: CompressionLibrary::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            lifetime: DEFAULT_LIFETIME,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            min_lifetime: DEFAULT_MIN_LIFETIME,
            bot_lifetime: DEFAULT_BOT_LIFETIME,
            bot_first_lifetime: DEFAULT_BOT_FIRST_LIFETIME,
            first_lifetime: DEFAULT_FIRST_LIFETIME,
            disable_locking: false,
            break_after: DEFAULT_BREAK_AFTER,
            fail_after: DEFAULT_FAIL_AFTER,
            zombie_interval_ticks: DEFAULT_ZOMBIE_INTERVAL_TICKS,
            sentinel: SentinelConfig {
                connect_retries: DEFAULT_SENTINEL_RETRIES,
                ..SentinelConfig::default()
            },
        }
    }
}

impl SessionConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    pub fn use_locking(&self) -> bool {
        !self.disable_locking
    }
}
