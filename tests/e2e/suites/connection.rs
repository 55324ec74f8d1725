//! 连接管理测试套件

#[cfg(test)]
mod connection_tests {
    use crate::setup::{TestEnvConfig, TestEnvironment};
    use futures::future::join_all;
    use ro::store::Store;
    use ro::store::redis_store::RedisConnector;
    use ro::{ConnectionManager, RedisConfig, RoError};
    use std::sync::Arc;

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_acquire_returns_shared_handle() {
        let env = TestEnvironment::setup().await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = env.manager.clone();
                tokio::spawn(async move { manager.acquire().await })
            })
            .collect();

        let first = env.manager.acquire().await.unwrap();
        for joined in join_all(tasks).await {
            let handle = joined.unwrap().unwrap();
            assert!(Arc::ptr_eq(&first, &handle));
        }
        first.ping().await.expect("ping 应成功");
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_unreachable_addr_is_not_cached() {
        let mut config = RedisConfig::new("127.0.0.1:1");
        config.connect_timeout_ms = 500;
        let manager = ConnectionManager::with_config(RedisConnector, config);

        assert!(manager.acquire().await.is_err());
        assert!(!manager.is_connected());

        // 修正配置后可以重新连接
        manager.set_config(TestEnvConfig::default().redis_config());
        assert!(manager.acquire().await.is_ok());
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_wrong_password_surfaces_redis_error() {
        let config = TestEnvConfig::default()
            .redis_config()
            .with_credentials(Some("nobody"), "definitely-wrong");
        let manager = ConnectionManager::with_config(RedisConnector, config);

        let result = manager.acquire().await;
        assert!(matches!(result, Err(RoError::Redis(_))));
    }
}
