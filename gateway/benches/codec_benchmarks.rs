//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


use bytes::{Bytes, BytesMut};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use muportal_common::telnet::consts::{IAC, SB, SE, WILL, option};
use muportal_common::{TelnetCodec, TelnetMessage};
use muportal_gateway::config::TelnetConfig;
use muportal_gateway::connection::{Protocol, TelnetConnection};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

/// Player input interleaved with window size reports
fn mixed_input(lines: usize) -> Vec<u8> {
    let mut input = Vec::new();
    for index in 0..lines {
        input.extend_from_slice(b"say The quick brown fox jumps over the lazy dog\r\n");
        if index % 10 == 0 {
            input.extend_from_slice(&[IAC, SB, option::NAWS, 0, 80, 0, 24, IAC, SE]);
        }
    }
    input
}

/// Benchmark decoding of plain lines and embedded subnegotiations
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("telnet_decode");
    for lines in [1usize, 100, 1000] {
        let input = mixed_input(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &input, |b, input| {
            b.iter(|| {
                let mut codec = TelnetCodec::new();
                let mut buffer = BytesMut::from(&input[..]);
                let mut count = 0;
                while let Ok(Some(message)) = codec.decode(&mut buffer) {
                    black_box(message);
                    count += 1;
                }
                count
            });
        });
    }
    group.finish();
}

/// Benchmark encoding output that needs IAC escaping
fn bench_encode(c: &mut Criterion) {
    let payload = Bytes::from(
        (0..4096u32)
            .map(|value| (value % 256) as u8)
            .collect::<Vec<u8>>(),
    );
    c.bench_function("telnet_encode_escaped", |b| {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::with_capacity(8192);
        b.iter(|| {
            buffer.clear();
            codec
                .encode(
                    TelnetMessage::AppData(black_box(payload.clone())),
                    &mut buffer,
                )
                .unwrap();
            buffer.len()
        });
    });
}

/// Benchmark a connection negotiating and then receiving input
fn bench_connection_receive(c: &mut Criterion) {
    let config = TelnetConfig::default();
    let mut input = vec![IAC, WILL, option::NAWS, IAC, WILL, option::TTYPE];
    input.extend_from_slice(&mixed_input(100));

    c.bench_function("telnet_connection_receive", |b| {
        b.iter(|| {
            let mut connection = TelnetConnection::new(&config, false);
            connection.start();
            let mut inbox = BytesMut::from(&input[..]);
            connection.receive(&mut inbox);
            let mut outbox = BytesMut::new();
            connection.take_output(&mut outbox);
            black_box(connection.take_events().len() + outbox.len())
        });
    });
}

criterion_group!(benches, bench_decode, bench_encode, bench_connection_receive);
criterion_main!(benches);
