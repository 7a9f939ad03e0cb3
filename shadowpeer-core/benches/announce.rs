use std::hint::black_box;

use bip_bencode::{ben_bytes, ben_int, ben_map};
use criterion::{Criterion, criterion_group, criterion_main};
use shadowpeer_core::tracker::{AnnounceRequestBuilder, decode_tracker_response};

fn tracker_reply(peer_count: usize) -> Vec<u8> {
    let peers: Vec<u8> = (0..peer_count)
        .flat_map(|i| [10, 0, (i >> 8) as u8, i as u8, 0x1A, 0xE1])
        .collect();
    let body = ben_map! {
        "complete" => ben_int!(120),
        "incomplete" => ben_int!(33),
        "interval" => ben_int!(1800),
        "min interval" => ben_int!(900),
        "peers" => ben_bytes!(peers)
    }
    .encode();

    let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n".to_vec();
    raw.extend_from_slice(&body);
    raw
}

fn bench_decode_response(c: &mut Criterion) {
    let reply = tracker_reply(200);
    c.bench_function("decode_tracker_response_200_peers", |b| {
        b.iter(|| decode_tracker_response(black_box(&reply)));
    });
}

fn bench_build_request(c: &mut Criterion) {
    let builder = AnnounceRequestBuilder::new("/announce")
        .info_hash(&[0xAB; 20])
        .peer_id(b"-UT355-abcdefghijklm")
        .port(51413)
        .stats(123_456_789, 0, 0)
        .key("1A2B3C4D")
        .passkey("0123456789abcdef");
    c.bench_function("build_announce_request", |b| {
        b.iter(|| black_box(&builder).build());
    });
}

criterion_group!(benches, bench_decode_response, bench_build_request);
criterion_main!(benches);
