use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use phantom_station::core::{derive_keys, ClientToStation, RegistrationFlags, SharedSecret, WireMessage};
use rand::RngCore;
use std::net::{IpAddr, Ipv4Addr};

fn message(padding: usize) -> Vec<u8> {
    WireMessage::new(
        SharedSecret::generate().expect("rng"),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        Some(443),
        RegistrationFlags::DARK_DECOY,
        ClientToStation {
            covert_address: Some("example.internal:8080".into()),
            masked_decoy_server_name: Some("cdn.example".into()),
            padding: (padding > 0).then(|| vec![0u8; padding]),
            ..Default::default()
        },
    )
    .encode()
    .unwrap_or_default()
}

fn bench_wire_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_decode");

    for &padding in &[0usize, 256, 4096, 60_000] {
        let bytes = message(padding);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(format!("decode_{padding}b_padding"), |b| {
            b.iter(|| {
                let _ = WireMessage::decode(&bytes);
            })
        });
    }

    let short = vec![0u8; 39];
    group.bench_function("reject_short", |b| {
        b.iter(|| {
            let _ = WireMessage::decode(&short);
        })
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    c.bench_function("derive_keys", |b| {
        b.iter_batched(
            || {
                let mut secret = [0u8; 32];
                rand::rng().fill_bytes(&mut secret);
                secret
            },
            |secret| {
                let _ = derive_keys(&secret);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_wire_decode, bench_key_derivation);
criterion_main!(benches);
