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

//! Request metadata consumed by the session handler.
//!
//! The handler records which request last acquired a session's lock and
//! classifies the user agent for the lifetime policy. Both are diagnostics:
//! an absent context only degrades logging, never correctness.

use std::env;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Option<String>,
    pub server_name: Option<String>,
    pub request_uri: Option<String>,
    pub script_name: Option<String>,
    pub user_agent: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl RequestContext {
    /// Build a context from the CGI-style process environment.
    pub fn from_env() -> Self {
        Self {
            method: env_var("REQUEST_METHOD"),
            server_name: env_var("SERVER_NAME"),
            request_uri: env_var("REQUEST_URI"),
            script_name: env_var("SCRIPT_NAME"),
            user_agent: env_var("HTTP_USER_AGENT"),
        }
    }

    /// Descriptor written to the session's `req` field on lock acquisition:
    /// `METHOD HOST URI` for web requests, `<script>` otherwise.
    pub fn describe(&self) -> String {
        match &self.method {
            Some(method) => format!(
                "{} {}{}",
                method,
                self.server_name.as_deref().unwrap_or(""),
                self.request_uri.as_deref().unwrap_or(""),
            ),
            None => format!("<{}>", self.script_name.as_deref().unwrap_or("unknown")),
        }
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_request_line() {
        let ctx = RequestContext {
            method: Some("GET".into()),
            server_name: Some("shop.example".into()),
            request_uri: Some("/checkout/cart".into()),
            script_name: Some("index.php".into()),
            user_agent: None,
        };
        assert_eq!(ctx.describe(), "GET shop.example/checkout/cart");
    }

    #[test]
    fn describe_falls_back_to_script_name() {
        let ctx = RequestContext {
            script_name: Some("cron.sh".into()),
            ..RequestContext::default()
        };
        assert_eq!(ctx.describe(), "<cron.sh>");

        assert_eq!(RequestContext::default().describe(), "<unknown>");
    }
}
