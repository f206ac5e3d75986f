#![allow(clippy::expect_used, clippy::unwrap_used)]

use phantom_station::core::{derive_keys, ClientToStation, FixedFields, RegistrationFlags};
use phantom_station::registration::RegistrationManager;
use phantom_station::station::sweep_expired;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

fn request() -> ClientToStation {
    ClientToStation {
        covert_address: Some("example.internal:8080".into()),
        ..Default::default()
    }
}

fn fixed(phantom: IpAddr) -> FixedFields {
    FixedFields {
        phantom,
        phantom_port: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_admissions_yield_one_winner() {
    let manager = Arc::new(RegistrationManager::new(Duration::from_secs(60), 10_000));
    let phantom = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
    let contenders = 64usize;
    let barrier = Arc::new(Barrier::new(contenders));
    let winners = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for i in 0..contenders {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        let winners = Arc::clone(&winners);
        tasks.spawn(async move {
            let keys = derive_keys(&[i as u8; 32]).unwrap();
            let reg = manager.new_registration(&request(), &fixed(phantom), keys, RegistrationFlags::empty());
            barrier.wait().await;
            if manager.add_registration(reg) {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(manager.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn lookups_during_inserts_see_whole_registrations() {
    let manager = Arc::new(RegistrationManager::new(Duration::from_secs(60), 100_000));

    let writer = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for i in 0..5_000u32 {
                let phantom = IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i + 1));
                let keys = derive_keys(&[7u8; 32]).unwrap();
                let reg = manager.new_registration(&request(), &fixed(phantom), keys, RegistrationFlags::empty());
                assert!(manager.add_registration(reg));
            }
        })
    };

    let mut readers = JoinSet::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        readers.spawn(async move {
            for i in 0..5_000u32 {
                let phantom = IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i + 1));
                if let Some(reg) = manager.check_registration(phantom) {
                    assert_eq!(reg.phantom(), phantom);
                    assert_eq!(reg.covert(), "example.internal:8080");
                }
                if i % 256 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
    }

    writer.await.unwrap();
    while let Some(res) = readers.join_next().await {
        res.unwrap();
    }
    assert_eq!(manager.len(), 5_000);
}

#[tokio::test]
async fn sweep_task_reclaims_expired_entries() {
    let manager = Arc::new(RegistrationManager::new(Duration::from_millis(50), 100));
    let phantom = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
    let keys = derive_keys(&[9u8; 32]).unwrap();
    let reg = manager.new_registration(&request(), &fixed(phantom), keys, RegistrationFlags::empty());
    assert!(manager.add_registration(reg));

    let cancel = CancellationToken::new();
    let sweep = tokio::spawn(sweep_expired(
        Arc::clone(&manager),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = manager.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.admitted_total, 1);

    cancel.cancel();
    sweep.await.unwrap();
}
