#![feature(test)]

extern crate test;

use httpbackend::{Backend, Options, Transport};
use serde_json::json;
use test::Bencher;

fn send(backend: &Backend, method: &str, url: &str) {
    let xhr = backend.request();
    xhr.open(method, url);
    xhr.send(None).unwrap();
}

#[bench]
fn bench_create_simple_stub(b: &mut Bencher) {
    let backend = Backend::new();

    b.iter(|| {
        backend.when("GET", "/").respond("test");
    })
}

#[bench]
fn bench_match_simple_stub(b: &mut Bencher) {
    let backend = Backend::new();
    backend.when("GET", "/").respond("test");

    b.iter(|| {
        send(&backend, "GET", "/");
        backend.flush();
    })
}

#[bench]
fn bench_match_glob_behind_many_stubs(b: &mut Bencher) {
    let backend = Backend::new();
    backend.set_defaults(Options::default().delay_ms(60_000));
    for i in 0..100 {
        backend
            .when("GET", format!("fixtures/{}/*.json", i))
            .respond(json!({ "index": i }));
    }

    b.iter(|| {
        send(&backend, "GET", "fixtures/99/data.json");
        backend.flush();
    })
}
