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

//! Lifetime policy cost per request, dominated by the bot regex.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use redsess_storage::{BotClassifier, LifetimePolicy, SessionConfig};

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                       (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const CRAWLER: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

fn bench_compute(c: &mut Criterion) {
    let policy = LifetimePolicy::from_config(&SessionConfig::default());
    let classifier = BotClassifier::new();

    let mut group = c.benchmark_group("lifetime/compute");
    for (label, session_writes, user_agent) in [
        ("browser-first-write", 0i64, BROWSER),
        ("browser-steady-state", 25, BROWSER),
        ("crawler", 0, CRAWLER),
        ("empty-user-agent", 0, ""),
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(label),
            &(session_writes, user_agent),
            |b, (writes, ua)| {
                b.iter(|| black_box(policy.compute(*writes, ua, &classifier)))
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_compute);
criterion_main!(benches);
