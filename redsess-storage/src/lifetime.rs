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

//! Adaptive session lifetimes.
//!
//! New sessions and bot sessions get short TTLs so one-hit visitors and
//! crawlers do not pin memory for the full steady-state lifetime. The
//! first-write tiers double on the second write (`base * (1 + writes)`),
//! so a session only graduates to the full lifetime once it proves itself.

use redsess_core::SessionConfig;

use crate::bot::BotClassifier;

#[derive(Debug, Clone, Copy)]
pub struct LifetimePolicy {
    pub lifetime: u64,
    pub max_lifetime: u64,
    pub min_lifetime: u64,
    pub bot_lifetime: u64,
    pub bot_first_lifetime: u64,
    pub first_lifetime: u64,
}

impl LifetimePolicy {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            lifetime: cfg.lifetime,
            max_lifetime: cfg.max_lifetime,
            min_lifetime: cfg.min_lifetime,
            bot_lifetime: cfg.bot_lifetime,
            bot_first_lifetime: cfg.bot_first_lifetime,
            first_lifetime: cfg.first_lifetime,
        }
    }

    /// TTL in seconds for a session with `session_writes` commits so far,
    /// clamped to `[min_lifetime, max_lifetime]`.
    pub fn compute(
        &self,
        session_writes: i64,
        user_agent: &str,
        classifier: &BotClassifier,
    ) -> u64 {
        let writes = session_writes.max(0) as u64;
        let mut life = None;

        if self.bot_lifetime > 0 && classifier.is_bot(user_agent) {
            tracing::debug!(user_agent, "bot detected for session lifetime");
            life = Some(if session_writes <= 1 && self.bot_first_lifetime > 0 {
                self.bot_first_lifetime * (1 + writes)
            } else {
                self.bot_lifetime
            });
        } else if session_writes <= 1 && self.first_lifetime > 0 {
            life = Some(self.first_lifetime * (1 + writes));
        }

        life.unwrap_or(self.lifetime)
            .min(self.max_lifetime)
            .max(self.min_lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LifetimePolicy {
        LifetimePolicy {
            lifetime: 1440,
            max_lifetime: 2_592_000,
            min_lifetime: 60,
            bot_lifetime: 7200,
            bot_first_lifetime: 60,
            first_lifetime: 600,
        }
    }

    const BROWSER: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0";

    #[test]
    fn first_write_doubles_on_second() {
        let c = BotClassifier::new();
        assert_eq!(policy().compute(0, BROWSER, &c), 600);
        assert_eq!(policy().compute(1, BROWSER, &c), 1200);
    }

    #[test]
    fn steady_state_uses_configured_lifetime() {
        let c = BotClassifier::new();
        assert_eq!(policy().compute(2, BROWSER, &c), 1440);
        assert_eq!(policy().compute(500, BROWSER, &c), 1440);
    }

    #[test]
    fn bots_get_the_bot_tiers() {
        let c = BotClassifier::new();
        assert_eq!(policy().compute(0, "Googlebot", &c), 60);
        assert_eq!(policy().compute(1, "Googlebot", &c), 120);
        assert_eq!(policy().compute(2, "Googlebot", &c), 7200);
    }

    #[test]
    fn fresh_bot_session_clamps_up_to_min_lifetime() {
        let mut p = policy();
        p.bot_lifetime = 600;
        p.bot_first_lifetime = 30;
        let c = BotClassifier::new();
        // 30 * (1 + 0) = 30, clamped up to the 60 second floor.
        assert_eq!(p.compute(0, "Googlebot", &c), 60);
    }

    #[test]
    fn disabled_bot_lifetime_falls_through_to_first_write_tier() {
        let mut p = policy();
        p.bot_lifetime = 0;
        let c = BotClassifier::new();
        assert_eq!(p.compute(0, "Googlebot", &c), 600);
    }

    #[test]
    fn result_never_exceeds_max_lifetime() {
        let mut p = policy();
        p.lifetime = 9_000_000;
        let c = BotClassifier::new();
        assert_eq!(p.compute(10, BROWSER, &c), 2_592_000);
    }
}
