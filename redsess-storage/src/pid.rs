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

//! Process identity and same-host liveness probing.
//!
//! A lock owner records itself as `hostname|pid`. Crash detection is
//! limited to contenders on the same host: for a foreign host, a non-Linux
//! OS, or a malformed identity the owner is assumed alive and the
//! lock-break timer clears it instead.

use once_cell::sync::Lazy;

static LOCAL_HOST: Lazy<String> = Lazy::new(local_hostname);

#[cfg(unix)]
fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn local_hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Stable identity of this process, written to the `pid` lock field.
pub fn identity() -> String {
    format!("{}|{}", LOCAL_HOST.as_str(), std::process::id())
}

/// Whether the process behind a recorded identity is still alive, as far
/// as this host can tell.
pub fn is_alive(identity: &str) -> bool {
    let Some((host, pid)) = identity.split_once('|') else {
        return true;
    };
    let Ok(pid) = pid.parse::<u32>() else {
        return true;
    };
    if !cfg!(target_os = "linux") || host != LOCAL_HOST.as_str() {
        return true;
    }
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_carries_host_and_pid() {
        let id = identity();
        let (host, pid) = id.split_once('|').unwrap();
        assert!(!host.is_empty());
        assert_eq!(pid.parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn own_process_is_alive() {
        assert!(is_alive(&identity()));
    }

    #[test]
    fn foreign_host_is_assumed_alive() {
        assert!(is_alive("some-other-host|1"));
        assert!(is_alive("some-other-host|999999999"));
    }

    #[test]
    fn malformed_identity_is_assumed_alive() {
        assert!(is_alive("no-separator"));
        assert!(is_alive("host|not-a-pid"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dead_local_pid_is_detected() {
        // Max pid on Linux is bounded well below this.
        let id = format!("{}|{}", LOCAL_HOST.as_str(), u32::MAX);
        assert!(!is_alive(&id));
    }
}
