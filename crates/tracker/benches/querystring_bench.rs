//! 요청 인코딩 벤치마크
//!
//! 페이로드 직렬화, 본문 인코딩, 저장값 코덱, 쿼리 파싱 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hct_core::types::PersistedState;
use hct_tracker::QueryParams;
use hct_tracker::codec::{decode_body, decode_stored, encode_body, encode_stored, to_query_string};
use serde_json::{Map, Value, json};

fn create_payload(phones: usize) -> Map<String, Value> {
    let numbers: Vec<String> = (0..phones).map(|i| format!("+3361234{i:04}")).collect();
    let payload = json!({
        "event_name": "add_to_cart",
        "datas": {"sku": "A-1042", "price": 19.9, "qty": 2},
        "contact": {"hct_e": "jean.dupont@example.fr", "hct_p": numbers, "hct_id_1": "42"},
        "external_cookies": {"_ga": "GA1.2.1234567890.1700000000", "_fbp": "fb.1.1700000000.42"},
        "token": "LOQ3X9ZAB12C",
        "session_token": "LOQ3XA0DE34F",
        "url": "https://shop.example/cart",
        "query": "?utm_source=google&utm_campaign=spring sale",
        "title": "Panier | Boutique",
        "referrer": "https://www.google.com/",
        "scr_resolution": {"screen_width": 1920, "screen_height": 1080, "device_pixel_ratio": 2},
        "anonym": false,
        "htms": {"utm_source": "google", "utm_campaign": "spring sale"},
    });
    match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn bench_query_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_query_string");
    for phones in [0usize, 4, 32] {
        let payload = create_payload(phones);
        group.throughput(Throughput::Elements(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(phones), &payload, |b, payload| {
            b.iter(|| to_query_string(black_box(payload)))
        });
    }
    group.finish();
}

fn bench_body(c: &mut Criterion) {
    let query = to_query_string(&create_payload(4));
    let body = encode_body(&query);
    let mut group = c.benchmark_group("body");
    group.throughput(Throughput::Bytes(query.len() as u64));
    group.bench_function("encode", |b| b.iter(|| encode_body(black_box(&query))));
    group.bench_function("decode", |b| b.iter(|| decode_body(black_box(&body))));
    group.finish();
}

fn bench_stored_state(c: &mut Criterion) {
    let mut state = PersistedState {
        anonym: Some(false),
        consent_at: Some(1_700_000_000_000),
        expired_at: Some(1_734_000_000_000),
        token: Some("LOQ3X9ZAB12C".to_owned()),
        session_token: Some("LOQ3XA0DE34F".to_owned()),
        session_expired_at: Some(1_700_001_800_000),
        browser_registered: Some(true),
        ..Default::default()
    };
    state.reset_session("LOQ3XA0DE34F");
    let encoded = encode_stored(&state).unwrap_or_default();

    let mut group = c.benchmark_group("stored_state");
    group.bench_function("encode", |b| b.iter(|| encode_stored(black_box(&state))));
    group.bench_function("decode", |b| {
        b.iter(|| decode_stored::<PersistedState>(black_box(&encoded)))
    });
    group.finish();
}

fn bench_query_parse(c: &mut Criterion) {
    let search = "?utm_source=google&utm_medium=cpc&utm_campaign=spring%20sale\
                  &gclid=Cj0KCQjw&email=jean.dupont%40example.fr&hct_ut[tracking_code]=T2";
    c.bench_function("query_params_parse", |b| {
        b.iter(|| QueryParams::parse(black_box(search)))
    });
}

criterion_group!(
    benches,
    bench_query_string,
    bench_body,
    bench_stored_state,
    bench_query_parse
);
criterion_main!(benches);
