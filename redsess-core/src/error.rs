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

//! Error types for RedSess

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedSessError {
    /// Construction-time failure; carries the last underlying cause.
    #[error("unable to connect to redis: {0}")]
    ConnectionFailed(#[source] Box<RedSessError>),

    /// Admission control tripped in the lock acquisition loop. Host
    /// frameworks translate this into an HTTP 503.
    #[error("session concurrency limit exceeded")]
    ConcurrentConnectionsExceeded,

    /// A tagged payload could not be decompressed.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("redis driver error: {0}")]
    Driver(#[from] redis::RedisError),

    #[error("redis connection is closed")]
    NotConnected,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RedSessError>;
