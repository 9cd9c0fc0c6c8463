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

//! Counter-based advisory session locking.
//!
//! The lock state lives entirely in the session hash: contenders
//! coordinate through atomic increments of the `lock` and `wait` counters,
//! with no server-side locking primitive. Acquisition is a bounded polling
//! loop with a fixed half-second tick:
//!
//! - an increment that lands on 1 takes the lock outright;
//! - after `break_after` seconds a contender steals a lock whose owner
//!   identity has stopped changing;
//! - every `zombie_interval` ticks the loop reaps waiter counts that no
//!   longer add up (a waiter crashed) and probes the recorded owner pid,
//!   resetting the lock when the owner is provably dead on this host;
//! - a `wait` count at the concurrency ceiling rejects the contender;
//! - after `break_after + fail_after` seconds the contender gives up and
//!   proceeds without the lock.
//!
//! Which contender wins a broken lock is intentionally indeterminate; the
//! next committed write restores the single-owner invariant.

use std::time::Duration;

use redsess_core::{RedSessError, Result, SessionConfig};

use crate::pid;
use crate::store::{RecordStore, FIELD_LOCK, FIELD_PID, FIELD_REQ, FIELD_WAIT, FIELD_WRITES};

/// The atomic time-tick of the acquisition loop.
pub const SLEEP_TIME: Duration = Duration::from_millis(500);

/// Extra sleep added on zombie-flag ticks so contenders drift apart.
const ZOMBIE_SLEEP_BONUS: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub use_locking: bool,
    /// Seconds before a contender is entitled to steal the lock.
    pub break_after: f64,
    /// Additional seconds past `break_after` before giving up.
    pub fail_after: f64,
    /// Ceiling on simultaneous waiters per session.
    pub max_concurrency: i64,
    /// Zombie detection cadence in ticks.
    pub zombie_interval: u32,
}

impl LockSettings {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            use_locking: cfg.use_locking(),
            break_after: cfg.break_after,
            fail_after: cfg.fail_after,
            max_concurrency: cfg.max_concurrency,
            zombie_interval: cfg.zombie_interval_ticks.max(2),
        }
    }

    fn break_after_ticks(&self) -> u32 {
        (self.break_after / SLEEP_TIME.as_secs_f64()).round() as u32
    }

    fn fail_after_ticks(&self) -> u32 {
        self.break_after_ticks() + (self.fail_after / SLEEP_TIME.as_secs_f64()).round() as u32
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy)]
pub struct Acquisition {
    pub has_lock: bool,
    /// Loop iterations spent; 0 means the lock was free.
    pub tries: u32,
    /// `lock` counter value observed at acquisition. A value above 1 means
    /// the lock was taken by breaking it.
    pub lock_count: i64,
}

/// Run the acquisition loop for `key` until the lock is held, broken,
/// rejected, or the deadline passes. Ownership (`pid`, `req`, the reset of
/// `lock` to 1) is recorded by the caller's post-acquisition pipeline.
///
/// On `ConcurrentConnectionsExceeded` the waiter has already been
/// de-registered from the `wait` counter.
pub fn acquire(
    store: &mut dyn RecordStore,
    key: &str,
    settings: &LockSettings,
) -> Result<Acquisition> {
    let break_after = settings.break_after_ticks();
    let fail_after = settings.fail_after_ticks();

    let mut tries: u32 = 0;
    let mut waiting: i64 = 0;
    let mut lock: i64 = 0;
    let mut lock_pid: Option<Vec<u8>> = None;
    let mut old_lock_pid: Option<Vec<u8>> = None;
    let mut detect_zombies = false;
    let mut has_lock = false;

    loop {
        let mut sleep_time = SLEEP_TIME;
        let old_lock = lock;
        lock = store.hincrby(key, FIELD_LOCK, 1)?;

        // Owner identity is only interesting once we are close enough to
        // the break deadline to compare it across ticks.
        if lock != 1 && tries + 1 >= break_after {
            lock_pid = store.hget(key, FIELD_PID)?;
        }

        if lock == 1 || (tries >= break_after && old_lock_pid == lock_pid) {
            // Either the increment took a free lock, or the owner has not
            // moved for the whole break window and we steal it.
            has_lock = true;
            break;
        }

        if waiting == 0 {
            // First-time waiter registration. The counter can be negative
            // after zombie corrections; keep incrementing until it reads
            // at least 1, bounded by the concurrency ceiling.
            let mut attempts: i64 = 0;
            loop {
                attempts += 1;
                waiting = store.hincrby(key, FIELD_WAIT, 1)?;
                if waiting >= 1 || attempts >= settings.max_concurrency {
                    break;
                }
            }
        } else {
            if detect_zombies {
                detect_zombies = false;
                // The lock counter should have advanced by exactly the
                // waiters still polling. If it is short, some waiter died
                // without de-registering.
                if lock > old_lock && lock + 1 < old_lock + waiting {
                    tracing::info!(
                        session = key,
                        tries,
                        lock,
                        waiting,
                        "detected zombie waiter; correcting wait count"
                    );
                    store.hincrby(key, FIELD_WAIT, -1)?;
                    continue;
                }
            }

            // A tick whose zombie condition fired skips this check via the
            // `continue` above; a merely zombie-flagged tick whose counters
            // still added up falls through and is admission-checked like
            // any other.
            if waiting >= settings.max_concurrency {
                store.hincrby(key, FIELD_WAIT, -1)?;
                let writes = counter_display(store.hget(key, FIELD_WRITES)?);
                let last_request = text_display(store.hget(key, FIELD_REQ)?);
                tracing::warn!(
                    session = key,
                    waiting,
                    max_concurrency = settings.max_concurrency,
                    writes = %writes,
                    last_request = %last_request,
                    "session concurrency limit reached; rejecting contender"
                );
                return Err(RedSessError::ConcurrentConnectionsExceeded);
            }
        }

        tries += 1;
        old_lock_pid = lock_pid.clone();

        if tries % settings.zombie_interval == 1 {
            detect_zombies = true;
            sleep_time += ZOMBIE_SLEEP_BONUS;
        }
        if tries % settings.zombie_interval == 0 {
            // Same-host crash detection: a recorded owner whose process is
            // gone will never release; clear the counter so the next
            // increment takes the lock cleanly.
            if let Some(owner) = store.hget(key, FIELD_PID)? {
                let owner = String::from_utf8_lossy(&owner).into_owned();
                if !owner.is_empty() && !pid::is_alive(&owner) {
                    tracing::info!(
                        session = key,
                        owner = %owner,
                        "lock owner is dead; resetting lock"
                    );
                    store.hset(key, FIELD_LOCK, b"0")?;
                    continue;
                }
            }
        }

        if tries >= fail_after {
            tracing::info!(
                session = key,
                tries,
                break_after = settings.break_after,
                fail_after = settings.fail_after,
                "gave up waiting for session lock"
            );
            break;
        }
        std::thread::sleep(sleep_time);
    }

    Ok(Acquisition {
        has_lock,
        tries,
        lock_count: lock,
    })
}

/// Ownership predicate for the commit path: the record is writable when no
/// owner is recorded or the recorded owner is us.
pub fn owned_elsewhere(store: &mut dyn RecordStore, key: &str, identity: &str) -> Result<bool> {
    match store.hget(key, FIELD_PID)? {
        Some(owner) => Ok(!owner.is_empty() && owner != identity.as_bytes()),
        None => Ok(false),
    }
}

fn counter_display(bytes: Option<Vec<u8>>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_else(|| "0".to_string())
}

fn text_display(bytes: Option<Vec<u8>>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::thread;

    fn settings(break_after: f64, fail_after: f64) -> LockSettings {
        LockSettings {
            use_locking: true,
            break_after,
            fail_after,
            max_concurrency: 6,
            zombie_interval: 20,
        }
    }

    #[test]
    fn free_lock_is_taken_on_the_first_increment() {
        let mut store = MemoryStore::new();
        let acq = acquire(&mut store, "sess_a", &settings(30.0, 15.0)).unwrap();
        assert!(acq.has_lock);
        assert_eq!(acq.tries, 0);
        assert_eq!(acq.lock_count, 1);
        assert_eq!(store.counter("sess_a", FIELD_WAIT), 0);
    }

    #[test]
    fn stable_owner_is_broken_after_the_break_window() {
        let store = MemoryStore::new();
        let mut owner = store.clone();
        owner.hincrby("sess_a", FIELD_LOCK, 1).unwrap();
        owner.hset("sess_a", FIELD_PID, b"otherhost|42").unwrap();

        let mut contender = store.clone();
        let acq = acquire(&mut contender, "sess_a", &settings(1.0, 1.0)).unwrap();
        assert!(acq.has_lock);
        assert!(acq.tries >= 2, "broke only after the break window");
        assert!(acq.lock_count > 1, "a broken lock leaves the counter high");
    }

    #[test]
    fn churning_owner_forces_give_up() {
        let store = MemoryStore::new();
        let mut owner = store.clone();
        owner.hincrby("sess_a", FIELD_LOCK, 1).unwrap();

        // A "live" owner keeps re-asserting a fresh identity, so the
        // owner-unchanged break condition never holds.
        let churn = store.clone();
        let churner = thread::spawn(move || {
            let mut churn = churn;
            for i in 0..30u32 {
                churn
                    .hset("sess_a", FIELD_PID, format!("otherhost|{i}").as_bytes())
                    .unwrap();
                thread::sleep(Duration::from_millis(150));
            }
        });

        let mut contender = store.clone();
        let acq = acquire(&mut contender, "sess_a", &settings(1.0, 1.0)).unwrap();
        churner.join().unwrap();

        assert!(!acq.has_lock);
        assert_eq!(acq.tries, 4, "break_after + fail_after in ticks");
    }

    #[test]
    fn admission_control_rejects_over_the_ceiling() {
        let store = MemoryStore::new();
        let mut owner = store.clone();
        owner.hincrby("sess_a", FIELD_LOCK, 1).unwrap();
        owner.hset("sess_a", FIELD_PID, b"otherhost|42").unwrap();

        let mut contender = store.clone();
        let mut s = settings(30.0, 15.0);
        s.max_concurrency = 1;
        let err = acquire(&mut contender, "sess_a", &s).unwrap_err();
        assert!(matches!(err, RedSessError::ConcurrentConnectionsExceeded));
        // The rejected contender de-registered itself.
        assert_eq!(store.counter("sess_a", FIELD_WAIT), 0);
    }

    #[test]
    fn zombie_waiters_are_reaped() {
        let store = MemoryStore::new();
        let mut owner = store.clone();
        // A held lock with an inflated wait count left by crashed waiters.
        owner.hincrby("sess_a", FIELD_LOCK, 10).unwrap();
        owner.hset("sess_a", FIELD_PID, b"otherhost|42").unwrap();
        owner.hincrby("sess_a", FIELD_WAIT, 5).unwrap();

        let mut contender = store.clone();
        let mut s = settings(2.0, 0.5);
        s.max_concurrency = 50;
        s.zombie_interval = 2;
        let acq = acquire(&mut contender, "sess_a", &s).unwrap();

        // Registration pushed wait to 6. With a single live contender the
        // lock counter advances one per tick, so each zombie pass before
        // the break finds the wait count short and takes one back: two
        // passes fire before the stable owner is broken.
        assert_eq!(store.counter("sess_a", FIELD_WAIT), 4);
        assert!(acq.has_lock, "stable owner is eventually broken");
    }

    // The /proc probe only works where /proc exists.
    #[cfg(target_os = "linux")]
    #[test]
    fn dead_owner_is_cleared_by_the_pid_probe() {
        let store = MemoryStore::new();
        let mut owner = store.clone();
        owner.hincrby("sess_a", FIELD_LOCK, 3).unwrap();
        // Same host, a pid that cannot exist.
        let dead = format!(
            "{}|{}",
            crate::pid::identity().split_once('|').unwrap().0,
            u32::MAX
        );
        owner.hset("sess_a", FIELD_PID, dead.as_bytes()).unwrap();

        let mut contender = store.clone();
        let mut s = settings(30.0, 15.0);
        s.zombie_interval = 2;
        let acq = acquire(&mut contender, "sess_a", &s).unwrap();

        assert!(acq.has_lock);
        assert_eq!(acq.lock_count, 1, "reset lock is taken cleanly");
        assert!(acq.tries >= 2, "probe runs on the even zombie phase");
    }

    #[test]
    fn ownership_predicate() {
        let mut store = MemoryStore::new();
        assert!(!owned_elsewhere(&mut store, "sess_a", "host|1").unwrap());
        store.hset("sess_a", FIELD_PID, b"host|1").unwrap();
        assert!(!owned_elsewhere(&mut store, "sess_a", "host|1").unwrap());
        store.hset("sess_a", FIELD_PID, b"host|2").unwrap();
        assert!(owned_elsewhere(&mut store, "sess_a", "host|1").unwrap());
        store.hset("sess_a", FIELD_PID, b"").unwrap();
        assert!(!owned_elsewhere(&mut store, "sess_a", "host|1").unwrap());
    }
}
