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

//! RedSess Storage
//!
//! Redis-backed session storage with optimistic mutual exclusion. Session
//! records are hashes at `sess_<id>` whose `lock`/`wait` counters carry an
//! advisory mutex between request workers, with bounded waiting,
//! lock-breaking, zombie-waiter correction, admission control, and
//! same-host crashed-owner detection.
//!
//! # Components
//!
//! - [`codec`]: self-describing payload compression (`:gz:`, `:l4:`,
//!   `:sn:`, `:lz:` tags)
//! - [`bot`]: crawler classification for the lifetime policy
//! - [`lifetime`]: adaptive TTLs for new, bot, and steady-state sessions
//! - [`pid`]: process identity and same-host liveness probing
//! - [`store`]: the record-store abstraction (`RedisStore`, `MemoryStore`)
//! - [`lock`]: the counter-based lock engine
//! - [`handler`]: the open/read/write/destroy/close/gc surface

pub mod bot;
pub mod codec;
pub mod handler;
pub mod lifetime;
pub mod lock;
pub mod pid;
pub mod store;

pub use bot::{BotClassifier, BotOverride};
pub use codec::Codec;
pub use handler::{session_key, SessionHandler, SESSION_PREFIX};
pub use lifetime::LifetimePolicy;
pub use lock::{Acquisition, LockSettings, SLEEP_TIME};
pub use store::{MemoryStore, RecordStore, RedisStore, StoreOp};

pub use redsess_core::{
    CompressionLibrary, RedSessError, RequestContext, Result, SentinelConfig, SessionConfig,
};
