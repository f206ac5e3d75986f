use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use phantom_station::core::{derive_keys, ClientToStation, FixedFields, RegistrationFlags};
use phantom_station::registration::{RegistrationLookup, RegistrationManager};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

const TABLE_SIZE: u32 = 50_000;

fn phantom(i: u32) -> IpAddr {
    IpAddr::V4(Ipv4Addr::from(0x0A00_0000 | i))
}

#[allow(clippy::unwrap_used)]
fn populated() -> Arc<RegistrationManager> {
    let manager = Arc::new(RegistrationManager::new(Duration::from_secs(600), TABLE_SIZE as usize * 2));
    let request = ClientToStation {
        covert_address: Some("example.internal:8080".into()),
        ..Default::default()
    };
    let keys = derive_keys(&[7u8; 32]).unwrap();
    for i in 0..TABLE_SIZE {
        let fixed = FixedFields {
            phantom: phantom(i),
            phantom_port: None,
        };
        manager.add_registration(manager.new_registration(&request, &fixed, keys.clone(), RegistrationFlags::empty()));
    }
    manager
}

fn bench_lookup(c: &mut Criterion) {
    let manager = populated();
    let src = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
    let mut group = c.benchmark_group("registration_lookup");

    group.bench_function("hit", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 7919) % TABLE_SIZE;
            manager.is_registered(src, phantom(i), 443)
        })
    });

    group.bench_function("miss", |b| {
        let dst = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1));
        b.iter(|| manager.is_registered(src, dst, 443))
    });

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_admit(c: &mut Criterion) {
    let request = ClientToStation {
        covert_address: Some("example.internal:8080".into()),
        ..Default::default()
    };
    let keys = derive_keys(&[7u8; 32]).unwrap();

    c.bench_function("registration_admit_1k", |b| {
        b.iter_batched(
            || RegistrationManager::new(Duration::from_secs(600), 10_000),
            |manager| {
                for i in 0..1_000 {
                    let fixed = FixedFields {
                        phantom: phantom(i),
                        phantom_port: None,
                    };
                    manager.add_registration(manager.new_registration(
                        &request,
                        &fixed,
                        keys.clone(),
                        RegistrationFlags::empty(),
                    ));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_lookup, bench_admit);
criterion_main!(benches);
