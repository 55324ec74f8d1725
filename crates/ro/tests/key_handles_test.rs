//! 键句柄集成测试

use ro::store::memory::MemoryConnector;
use ro::{ConnectionManager, HashParameterKey, RedisConfig, RoError, SetParameterKey, Ttl};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_test::assert_ok;

fn manager() -> ConnectionManager {
    ConnectionManager::with_config(MemoryConnector::default(), RedisConfig::default())
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Session {
    user_id: u64,
    roles: Vec<String>,
}

#[tokio::test]
async fn test_hmget_returns_only_existing_fields() {
    let key = manager().hash_key("hash:batch");
    assert_ok!(key.hset("1", "1").await);
    assert_ok!(key.hset("2", "2").await);

    let values = key.hmget(&["1", "2", "not exists"]).await.unwrap();

    let expected = HashMap::from([
        ("1".to_string(), "1".to_string()),
        ("2".to_string(), "2".to_string()),
    ]);
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_string_object_with_expiry() {
    let key = manager().string_key("session:abc");
    let session = Session {
        user_id: 9,
        roles: vec!["admin".to_string()],
    };

    assert_ok!(key.set_object(&session, Some(Duration::from_millis(50))).await);
    assert_eq!(key.get_object::<Session>().await.unwrap(), session);
    assert!(matches!(key.ttl().await.unwrap(), Ttl::ExpiresIn(_)));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(matches!(key.get().await, Err(RoError::Nil { .. })));
    assert_eq!(key.ttl().await.unwrap(), Ttl::Missing);
}

#[tokio::test]
async fn test_parameter_keys_share_connection() {
    let manager = manager();
    let followers: SetParameterKey = manager.parameter_key("user:{}:followers");
    let profile: HashParameterKey = manager.parameter_key("user:{}:profile");

    let set = followers.param(&[&1]);
    assert_eq!(set.name(), "user:1:followers");
    assert_ok!(set.sadd(&["2", "3"]).await);
    assert_eq!(set.scard().await.unwrap(), 2);

    let hash = profile.param(&[&1]);
    assert_ok!(hash.hset("name", "alice").await);
    assert_eq!(
        manager.hash_key("user:1:profile").hget("name").await.unwrap(),
        "alice"
    );
}

#[tokio::test]
async fn test_stream_consumer_group_flow() {
    let stream = manager().stream_key("events:orders");
    assert_ok!(stream.xgroup_create_from_end("billing").await);

    let id = stream
        .xadd_to_end(&["order_id", "1001", "amount", "30"])
        .await
        .unwrap();

    let messages = stream
        .xgroup_read("billing", "worker-1", 10, Some(Duration::from_millis(10)), false)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].values["amount"], "30");

    assert_eq!(stream.xack("billing", &[id.as_str()]).await.unwrap(), 1);
    assert!(matches!(
        stream.xgroup_read("billing", "worker-1", 10, None, false).await,
        Err(RoError::RecordNotFound)
    ));
}

#[tokio::test]
async fn test_wrong_type_is_reported() {
    let manager = manager();
    assert_ok!(manager.string_key("typed").set("v", None).await);

    let result = manager.hash_key("typed").hset("f", "v").await;
    assert!(matches!(result, Err(RoError::Store(msg)) if msg.starts_with("WRONGTYPE")));
}
