use criterion::{black_box, criterion_group, criterion_main, Criterion};
use transfernet::http::response::parse_http_date;
use transfernet::http::{HeaderCase, HttpHeaders};

const RESPONSE_HEADERS: &[(&str, &str)] = &[
    ("content-type", "application/json; charset=utf-8"),
    ("content-length", "18342"),
    ("date", "Sun, 06 Nov 1994 08:49:37 GMT"),
    ("etag", "\"33a64df551425fcc55e4d42a148795d9f25f89d4\""),
    ("cache-control", "public, max-age=3600"),
    ("vary", "Accept-Encoding"),
    ("server", "nginx"),
    ("x-request-id", "f058ebd6-02f7-4d3f-942e-904344e8cde5"),
    ("strict-transport-security", "max-age=63072000; includeSubDomains; preload"),
    ("access-control-allow-origin", "*"),
];

fn populated(case: HeaderCase) -> HttpHeaders {
    let mut headers = HttpHeaders::with_case(case);
    for (name, value) in RESPONSE_HEADERS {
        headers.set(name, *value);
    }
    headers
}

fn benchmark_headers_set(c: &mut Criterion) {
    c.bench_function("headers_set", |b| {
        b.iter(|| black_box(populated(HeaderCase::Original)))
    });
    c.bench_function("headers_set_header_case", |b| {
        b.iter(|| black_box(populated(HeaderCase::HeaderCase)))
    });
}

fn benchmark_headers_lookup(c: &mut Criterion) {
    let headers = populated(HeaderCase::Original);
    c.bench_function("headers_lookup_mixed_case", |b| {
        b.iter(|| {
            black_box(headers.get(black_box("X-Request-ID")));
            black_box(headers.content_type());
            black_box(headers.charset());
            black_box(headers.etag())
        })
    });
}

fn benchmark_rekey(c: &mut Criterion) {
    let headers = populated(HeaderCase::Original);
    c.bench_function("headers_rekey", |b| {
        b.iter(|| {
            let mut headers = headers.clone();
            headers.set_header_case(HeaderCase::Upper);
            black_box(headers)
        })
    });
}

fn benchmark_http_date(c: &mut Criterion) {
    c.bench_function("parse_http_date", |b| {
        b.iter(|| parse_http_date(black_box("Sun, 06 Nov 1994 08:49:37 GMT")))
    });
}

criterion_group!(
    benches,
    benchmark_headers_set,
    benchmark_headers_lookup,
    benchmark_rekey,
    benchmark_http_date
);
criterion_main!(benches);
