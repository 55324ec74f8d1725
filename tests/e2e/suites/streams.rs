//! 流与消费组测试套件

#[cfg(test)]
mod stream_tests {
    use crate::setup::TestEnvironment;
    use ro::{RoError, XAddArgs};
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_consumer_group_flow() {
        let env = TestEnvironment::setup().await.unwrap();
        let stream = env.manager.stream_key(env.key_name("stream"));

        stream.xgroup_create_from_beginning("workers").await.unwrap();
        let id = stream
            .xadd_to_end(&["event", "signup", "user", "7"])
            .await
            .unwrap();

        let messages = stream
            .xgroup_read("workers", "consumer-1", 10, Some(Duration::from_millis(100)), false)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].values["user"], "7");

        assert_eq!(stream.xack("workers", &[id.as_str()]).await.unwrap(), 1);

        let empty = stream
            .xgroup_read("workers", "consumer-1", 10, Some(Duration::from_millis(100)), false)
            .await;
        assert!(matches!(empty, Err(RoError::RecordNotFound)));

        assert!(stream.xgroup_create_from_end("workers").await.is_err());

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_xadd_with_trimming() {
        let env = TestEnvironment::setup().await.unwrap();
        let stream = env.manager.stream_key(env.key_name("stream:trim"));

        for i in 0..20 {
            stream
                .xadd(XAddArgs {
                    id: "*".to_string(),
                    max_len: 5,
                    values: HashMap::from([("seq".to_string(), i.to_string())]),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let mut conn = env.raw();
        let len: u64 = redis::cmd("XLEN")
            .arg(stream.name())
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(len, 5);

        // 近似裁剪只保证不少于 max_len
        stream
            .xadd(XAddArgs {
                id: "*".to_string(),
                max_len: 5,
                limit: 100,
                values: HashMap::from([("seq".to_string(), "last".to_string())]),
            })
            .await
            .unwrap();
        let len: u64 = redis::cmd("XLEN")
            .arg(stream.name())
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(len >= 5);

        env.cleanup().await.unwrap();
    }
}
