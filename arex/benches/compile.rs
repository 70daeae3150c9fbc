use arex::{compile, ExecFlags, Flags};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_literal", |b| {
        b.iter(|| compile("needle in a haystack", Flags::ADVANCED).unwrap())
    });
    c.bench_function("compile_structured", |b| {
        b.iter(|| compile(r"(\w+)://([^/ ]+)(/[^ ]*)?", Flags::ADVANCED).unwrap())
    });
    c.bench_function("compile_backref", |b| {
        b.iter(|| compile(r"(.+)\1{1,3}", Flags::ADVANCED).unwrap())
    });
}

fn bench_execute(c: &mut Criterion) {
    let re = compile(r"(\w+)://([^/ ]+)(/[^ ]*)?", Flags::ADVANCED).unwrap();
    let hay: Vec<char> = "padding padding https://example.com/path more padding"
        .chars()
        .collect();
    c.bench_function("execute_url", |b| {
        b.iter(|| re.execute(&hay, 4, ExecFlags::empty(), None).unwrap())
    });

    let re = compile("(a|b)*abb", Flags::ADVANCED).unwrap();
    let hay: Vec<char> = "ab".repeat(100).chars().chain("abb".chars()).collect();
    c.bench_function("execute_iteration", |b| {
        b.iter(|| re.execute(&hay, 2, ExecFlags::empty(), None).unwrap())
    });
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
