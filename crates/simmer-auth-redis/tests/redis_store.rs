//! Round-trip tests against a real Redis instance.
//!
//! These need a Docker daemon and are skipped by default; run them with
//! `cargo test -p simmer-auth-redis -- --ignored`.

use std::time::Duration;

use simmer_auth::config::RedisConfig;
use simmer_auth::store::KeyValueStore;
use simmer_auth_redis::RedisKeyValueStore;
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use testcontainers_modules::testcontainers::runners::AsyncRunner;

async fn live_store() -> (
    testcontainers_modules::testcontainers::ContainerAsync<Redis>,
    RedisKeyValueStore,
) {
    let container = Redis::default().start().await.expect("redis container");
    let port = container
        .get_host_port_ipv4(REDIS_PORT)
        .await
        .expect("mapped port");

    let config = RedisConfig {
        enabled: true,
        url: format!("redis://127.0.0.1:{port}"),
        ..RedisConfig::default()
    };
    let store = RedisKeyValueStore::connect(&config).expect("pool");
    (container, store)
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_live_round_trip_scan_and_delete() {
    let (_container, store) = live_store().await;

    store.ping().await.expect("ping");

    store
        .set_with_ttl("auth:simmer:u1:abc", b"payload-a", Duration::from_secs(60))
        .await
        .expect("set u1/abc");
    store
        .set_with_ttl("auth:simmer:u1:def", b"payload-b", Duration::from_secs(60))
        .await
        .expect("set u1/def");
    store
        .set_with_ttl("auth:simmer:u2:abc", b"payload-c", Duration::from_secs(60))
        .await
        .expect("set u2/abc");

    assert_eq!(
        store.get("auth:simmer:u1:abc").await.expect("get"),
        Some(b"payload-a".to_vec())
    );
    assert_eq!(store.get("auth:simmer:ghost:x").await.expect("get"), None);

    let mut keys = store.keys_matching("auth:simmer:u1:*").await.expect("scan");
    keys.sort();
    assert_eq!(keys, ["auth:simmer:u1:abc", "auth:simmer:u1:def"]);

    assert_eq!(store.delete(&keys).await.expect("delete"), 2);
    assert_eq!(store.get("auth:simmer:u1:abc").await.expect("get"), None);
    assert!(
        store
            .get("auth:simmer:u2:abc")
            .await
            .expect("get")
            .is_some(),
        "the other subject's entry must survive"
    );
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_live_ttl_expires_entries() {
    let (_container, store) = live_store().await;

    store
        .set_with_ttl("auth:simmer:u9:ttl", b"short-lived", Duration::from_millis(80))
        .await
        .expect("set");
    assert!(store.get("auth:simmer:u9:ttl").await.expect("get").is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.get("auth:simmer:u9:ttl").await.expect("get"), None);

    store.close().await;
}
