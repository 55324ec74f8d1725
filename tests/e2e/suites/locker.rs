//! 分布式锁测试套件
//!
//! 验证跨连接的互斥、过期释放、超时和 panic 隔离。

#[cfg(test)]
mod locker_tests {
    use crate::setup::TestEnvironment;
    use futures::future::join_all;
    use ro::store::redis_store::RedisConnector;
    use ro::{ConnectionManager, RoError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ignore = "需要 Redis"]
    async fn test_mutual_exclusion_across_managers() {
        let env = TestEnvironment::setup().await.unwrap();
        let name = env.key_name("lock:exclusive");
        let counter = Arc::new(AtomicUsize::new(0));

        // 两个独立的管理器模拟两个进程
        let other = ConnectionManager::with_config(RedisConnector, env.config.redis_config());
        let managers = [env.manager.clone(), other];

        let mut tasks = Vec::new();
        for i in 0..1000 {
            let key = managers[i % 2].string_key(name.clone());
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                key.get_locker(Duration::from_secs(30), move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        let acquired = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .filter(Option::is_some)
            .count();

        assert_eq!(acquired, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // 锁值为空串，并带有过期时间
        assert_eq!(env.raw_get(&name).await.unwrap(), Some(String::new()));
        assert!(env.raw_pttl(&name).await.unwrap() > 0);

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_lock_released_after_expiry() {
        let env = TestEnvironment::setup().await.unwrap();
        let key = env.manager.string_key(env.key_name("lock:expiry"));

        let first = key
            .get_locker(Duration::from_millis(200), |_| async { Ok(1) })
            .await
            .unwrap();
        let blocked = key
            .get_locker(Duration::from_millis(200), |_| async { Ok(2) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let after = key
            .get_locker(Duration::from_millis(200), |_| async { Ok(3) })
            .await
            .unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(blocked, None);
        assert_eq!(after, Some(3));

        env.cleanup().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis"]
    async fn test_deadline_and_panic() {
        let env = TestEnvironment::setup().await.unwrap();

        let slow = env
            .manager
            .string_key(env.key_name("lock:slow"))
            .get_locker(Duration::from_millis(100), |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(matches!(slow, Err(RoError::DeadlineExceeded)));

        let panicked: ro::Result<Option<()>> = env
            .manager
            .string_key(env.key_name("lock:panic"))
            .get_locker(Duration::from_secs(5), |_| async { panic!("boom") })
            .await;
        assert!(matches!(panicked, Err(RoError::HandlerFault(msg)) if msg == "boom"));

        env.cleanup().await.unwrap();
    }
}
