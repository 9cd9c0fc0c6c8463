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

//! Codec throughput across the supported compression libraries.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use redsess_storage::{Codec, CompressionLibrary};

fn session_payload(size: usize) -> Vec<u8> {
    // Repetitive key/value session data, the shape the codec sees in
    // production.
    b"cart|items:3|sku:ABC-123|qty:2|visitor:99281|currency:EUR|"
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    for size in [4 * 1024, 64 * 1024] {
        let payload = session_payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        for library in [
            CompressionLibrary::Gzip,
            CompressionLibrary::Lz4,
            CompressionLibrary::Snappy,
        ] {
            let codec = Codec::new(library, 1024);
            group.bench_with_input(
                BenchmarkId::new(library.as_str(), size),
                &payload,
                |b, payload| b.iter(|| black_box(codec.encode(payload))),
            );
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");
    let payload = session_payload(64 * 1024);
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for library in [
        CompressionLibrary::Gzip,
        CompressionLibrary::Lz4,
        CompressionLibrary::Snappy,
    ] {
        let codec = Codec::new(library, 1024);
        let encoded = codec.encode(&payload);
        group.bench_with_input(
            BenchmarkId::new(library.as_str(), payload.len()),
            &encoded,
            |b, encoded| b.iter(|| black_box(codec.decode(encoded).unwrap())),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
