use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use vizdata::{fix_road, keep_max, roads_frame, GeometryValue, RawEdge, TagValue};

fn sample_edges(count: i64) -> Vec<RawEdge> {
    (0..count)
        .map(|i| RawEdge {
            u: i,
            v: i + 1,
            key: 0,
            attrs: BTreeMap::from([
                ("osmid".to_string(), TagValue::parse_encoded("[4312, 4313]")),
                ("highway".to_string(), TagValue::from_osm_tag("primary;secondary")),
                ("lanes".to_string(), TagValue::from_osm_tag("2;3")),
                ("maxspeed".to_string(), TagValue::from("50 mph")),
                ("length".to_string(), TagValue::from("118.4")),
            ]),
            geometry: GeometryValue::Wkt(format!("LINESTRING({} 40, {} 40.1)", i, i + 1)),
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let lanes = TagValue::from_osm_tag("2;3;4 lanes");
    c.bench_function("keep_max", |b| b.iter(|| keep_max(black_box(&lanes))));

    let edges = sample_edges(10_000);
    c.bench_function("fix_road_10k", |b| {
        b.iter(|| {
            let rows: Vec<_> = edges.iter().cloned().map(fix_road).collect();
            roads_frame(black_box(&rows))
        })
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
