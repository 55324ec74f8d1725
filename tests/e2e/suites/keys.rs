//! 字符串、哈希、集合键测试套件

#[cfg(test)]
mod key_tests {
    use crate::setup::TestEnvironment;
    use chrono::Utc;
    use ro::{RoError, StringParameterKey, Ttl};
    use serde::{Deserialize, Serialize};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        level: u32,
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_string_key_operations() {
        let env = TestEnvironment::setup().await.unwrap();
        let key = env.manager.string_key(env.key_name("string"));

        assert!(matches!(key.get().await, Err(RoError::Nil { .. })));
        assert_eq!(key.get_default("none").await, "none");

        key.set("hello", Some(Duration::from_secs(30))).await.unwrap();
        assert_eq!(key.get().await.unwrap(), "hello");
        assert_eq!(env.raw_get(key.name()).await.unwrap().as_deref(), Some("hello"));
        assert!(matches!(key.ttl().await.unwrap(), Ttl::ExpiresIn(_)));

        assert!(!key.set_nx("other", None).await.unwrap());

        let counter = env.manager.string_key(env.key_name("counter"));
        assert_eq!(counter.increase().await.unwrap(), 1);
        assert_eq!(counter.increase_by(41).await.unwrap(), 42);
        assert_eq!(counter.get_i64().await.unwrap(), 42);

        let profile = Profile {
            name: "alice".into(),
            level: 2,
        };
        let object = env.manager.string_key(env.key_name("object"));
        object.set_object(&profile, None).await.unwrap();
        assert_eq!(object.get_object::<Profile>().await.unwrap(), profile);
        // 存储端保存的是 JSON 文本
        let raw = env.raw_get(object.name()).await.unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, serde_json::json!({ "name": "alice", "level": 2 }));
        assert_eq!(object.ttl().await.unwrap(), Ttl::NoExpiry);

        object
            .expire_at(Utc::now() + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert!(env.raw_pttl(object.name()).await.unwrap() > 30_000);

        object.del().await.unwrap();
        assert!(!object.exists().await.unwrap());

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_hash_key_operations() {
        let env = TestEnvironment::setup().await.unwrap();
        let key = env.manager.hash_key(env.key_name("hash"));

        key.hset("1", "1").await.unwrap();
        key.hset("2", "2").await.unwrap();

        let values = key.hmget(&["1", "2", "not exists"]).await.unwrap();
        assert_eq!(
            values,
            HashMap::from([("1".to_string(), "1".to_string()), ("2".to_string(), "2".to_string())])
        );

        assert!(key.hget("not exists").await.unwrap_err().is_nil());
        assert_eq!(key.hlen().await.unwrap(), 2);

        key.hdel(&["1"]).await.unwrap();
        assert_eq!(key.hgetall().await.unwrap().len(), 1);

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_set_key_operations() {
        let env = TestEnvironment::setup().await.unwrap();
        let key = env.manager.set_key(env.key_name("set"));

        key.sadd(&["a", "b", "c"]).await.unwrap();
        key.srem(&["c"]).await.unwrap();

        assert!(key.sismember("a").await.unwrap());
        assert_eq!(key.scard().await.unwrap(), 2);
        assert_eq!(
            key.smembers_set().await.unwrap(),
            HashSet::from(["a".to_string(), "b".to_string()])
        );

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_parameter_key() {
        let env = TestEnvironment::setup().await.unwrap();
        let pattern = format!("{}:{{}}", env.key_name("user"));
        let users: StringParameterKey = env.manager.parameter_key(pattern);

        let key = users.param(&[&42]);
        // 登记清理
        env.key_name("user:42");
        key.set("answer", None).await.unwrap();
        assert_eq!(env.raw_get(key.name()).await.unwrap().as_deref(), Some("answer"));

        env.cleanup().await.unwrap();
    }
}
