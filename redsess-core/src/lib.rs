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

//! RedSess Core
//!
//! Fundamental types shared across the RedSess workspace: the error
//! taxonomy, the configuration surface, and the request context value
//! object. The storage engine itself lives in `redsess-storage`.

pub mod config;
pub mod context;
pub mod error;

pub use config::{CompressionLibrary, SentinelConfig, SessionConfig};
pub use context::RequestContext;
pub use error::{RedSessError, Result};
