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

//! Crawler detection for the lifetime policy.
//!
//! An empty user agent counts as a bot. A handler-scoped override hook can
//! veto or confirm the regex verdict.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

static BOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "(?i)^alexa|^blitz\\.io|bot|^browsermob|crawl|^curl|^facebookexternalhit|feed|",
        "google web preview|^ia_archiver|indexer|^java|jakarta|^load impact|^magespeedtest|",
        "monitor|^Mozilla$|nagios |^\\.net|^pinterest|postrank|slurp|spider|uptime|^wget|yandex",
    ))
    .expect("bot pattern is valid")
});

/// Override hook invoked with `(user_agent, regex_verdict)`; its return
/// value is the final classification.
pub type BotOverride = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct BotClassifier {
    override_fn: Option<BotOverride>,
}

impl BotClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override<F>(f: F) -> Self
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        Self {
            override_fn: Some(Arc::new(f)),
        }
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        let verdict = user_agent.is_empty() || BOT_PATTERN.is_match(user_agent);
        match &self.override_fn {
            Some(f) => f(user_agent, verdict),
            None => verdict,
        }
    }
}

impl fmt::Debug for BotClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotClassifier")
            .field("override", &self.override_fn.is_some())
            .finish()
    }
}
