use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Creates a component that needs async setup before services start.
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service started through [`TaskManager`].
///
/// # Example
///
/// ```no_run
/// use liquidd::providers::traits::ServiceProvider;
/// use liquidd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for Heartbeat {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("heartbeat".to_string(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         }).await
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Spawns the service's task(s).
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    /// Higher numbers start first.
    fn priority(&self) -> i32 {
        0
    }

    /// A critical service failing to start aborts startup.
    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    struct WaitsForCancel {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ServiceProvider for WaitsForCancel {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            let stopped = self.stopped.clone();
            task_manager
                .spawn_task(self.name().to_string(), |token| async move {
                    token.cancelled().await;
                    stopped.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }

        fn name(&self) -> &'static str {
            "waits_for_cancel"
        }

        fn priority(&self) -> i32 {
            3
        }
    }

    struct FailsToStart;

    #[async_trait]
    impl ServiceProvider for FailsToStart {
        async fn start(&self, _task_manager: &mut TaskManager) -> Result<()> {
            Err(anyhow!("bus unavailable"))
        }

        fn name(&self) -> &'static str {
            "fails_to_start"
        }

        fn is_critical(&self) -> bool {
            true
        }
    }

    struct Fixed(u32);

    #[async_trait]
    impl AsyncProvider<u32> for Fixed {
        async fn provide(&self) -> Result<u32> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn started_service_stops_on_shutdown() {
        let mut task_manager = TaskManager::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let service = WaitsForCancel {
            stopped: stopped.clone(),
        };

        service.start(&mut task_manager).await.unwrap();
        assert!(task_manager.is_running("waits_for_cancel"));
        assert!(!stopped.load(Ordering::SeqCst));

        task_manager.shutdown_all().await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_service_reports_error() {
        let mut task_manager = TaskManager::new();
        let err = FailsToStart.start(&mut task_manager).await.unwrap_err();

        assert_eq!(err.to_string(), "bus unavailable");
        assert_eq!(task_manager.active_count(), 0);
        assert!(FailsToStart.is_critical());
        assert_eq!(FailsToStart.priority(), 0);
    }

    #[tokio::test]
    async fn async_provider_trait_object() {
        let providers: Vec<Box<dyn AsyncProvider<u32> + Send + Sync>> =
            vec![Box::new(Fixed(1)), Box::new(Fixed(2))];

        let mut values = Vec::new();
        for provider in &providers {
            values.push(provider.provide().await.unwrap());
        }
        assert_eq!(values, vec![1, 2]);
    }
}
