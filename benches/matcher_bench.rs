//! Address-pattern matching performance benchmark.

use criterion::{criterion_group, criterion_main, Criterion};
use trustnet::sites::{AddressMatcher, WildcardDepth};

const FORCED_LIST: &str = "bank.example *.shop.example intranet.example:0 \
                           192.168 https://pinned.example/app* ^https://only.example$";

fn matcher_test(c: &mut Criterion) {
    let (matcher, errors) = AddressMatcher::compile(FORCED_LIST, WildcardDepth::One);
    assert!(errors.is_empty());

    c.bench_function("matcher_hit_exact", |b| {
        b.iter(|| matcher.test("https://bank.example/login"))
    });

    c.bench_function("matcher_hit_wildcard", |b| {
        b.iter(|| matcher.test("https://www.shop.example/cart"))
    });

    c.bench_function("matcher_miss", |b| {
        b.iter(|| matcher.test("https://unrelated-host.example/index"))
    });
}

fn matcher_compile(c: &mut Criterion) {
    c.bench_function("matcher_compile_list", |b| {
        b.iter(|| AddressMatcher::compile(FORCED_LIST, WildcardDepth::One))
    });
}

criterion_group!(benches, matcher_test, matcher_compile);
criterion_main!(benches);
