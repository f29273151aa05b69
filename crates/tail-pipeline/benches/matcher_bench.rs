//! 매처 벤치마크
//!
//! KMP 포함 매처와 와일드카드 접두 매칭의 처리량을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tailpost_tail_pipeline::matcher::{ContainsMatcher, Matcher, wildcard_match};

/// 짧은 한 줄 레코드
const SHORT_RECORD: &[u8] = b"2024-01-15 12:00:00 ERROR request failed: connection reset";

/// 멀티라인 스택트레이스 레코드 조각
const LONG_RECORD: &[u8] = b"2024-01-15 12:00:00 ERROR unhandled exception in request handler\n    at handler.process(handler.rs:42)\n    at router.dispatch(router.rs:118)\n    at server.accept_loop(server.rs:311)\n    at runtime.spawn(runtime.rs:77)\ncaused by: connection reset by peer (os error 104)\n    at socket.read(socket.rs:209)\n    at stream.fill_buf(stream.rs:63)";

fn bench_contains(c: &mut Criterion) {
    let matcher = ContainsMatcher::new("ERROR", true).unwrap();
    let miss_matcher = ContainsMatcher::new("UNSEEN_PATTERN", true).unwrap();

    let mut group = c.benchmark_group("contains_matcher");

    group.throughput(Throughput::Bytes(SHORT_RECORD.len() as u64));
    group.bench_function("short_hit", |b| {
        b.iter(|| matcher.matches(black_box(SHORT_RECORD)))
    });

    group.throughput(Throughput::Bytes(LONG_RECORD.len() as u64));
    group.bench_function("long_hit", |b| {
        b.iter(|| matcher.matches(black_box(LONG_RECORD)))
    });

    // 전체 스캔이 필요한 미스 경로
    group.bench_function("long_miss", |b| {
        b.iter(|| miss_matcher.matches(black_box(LONG_RECORD)))
    });

    group.finish();
}

fn bench_wildcard(c: &mut Criterion) {
    let mut group = c.benchmark_group("wildcard_match");

    group.throughput(Throughput::Elements(1));
    group.bench_function("date_prefix_hit", |b| {
        b.iter(|| wildcard_match(black_box("!!!!-!!-!!"), black_box(SHORT_RECORD)))
    });

    group.bench_function("date_prefix_miss", |b| {
        b.iter(|| wildcard_match(black_box("!!!!-!!-!!"), black_box(b"    at handler.process")))
    });

    group.finish();
}

criterion_group!(benches, bench_contains, bench_wildcard);
criterion_main!(benches);
