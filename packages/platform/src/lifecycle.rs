use std::sync::Mutex;

use async_trait::async_trait;
use platform_types::Descriptor;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LifecycleError {
    #[error("service already started")]
    AlreadyStarted,
    #[error("start {name}: {cause}")]
    StartFailed { name: String, cause: String },
}

/// Anything `LifecycleManager` can register: a name for error reporting,
/// ordered `start`/`stop` hooks, and an optional descriptor.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<(), String>;
    async fn stop(&self) -> Result<(), String>;
    fn descriptor(&self) -> Option<Descriptor> {
        None
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Registering,
    Started,
    Stopped,
}

/// Deterministic ordered lifecycle for every registered service: `Start`
/// runs services in registration order and rolls back on the first failure;
/// `Stop` runs in reverse order and is best-effort, aggregating the first
/// error while still attempting every service.
pub struct LifecycleManager {
    services: Mutex<Vec<std::sync::Arc<dyn Lifecycle>>>,
    phase: Mutex<Phase>,
    start_result: Mutex<Option<Result<(), LifecycleError>>>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Registering),
            start_result: Mutex::new(None),
        }
    }

    pub fn register(&self, service: std::sync::Arc<dyn Lifecycle>) -> Result<(), LifecycleError> {
        if *self.phase.lock().unwrap() != Phase::Registering {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.services.lock().unwrap().push(service);
        Ok(())
    }

    /// Starts every registered service in order. Idempotent: a second call
    /// returns the first call's result without re-running anything.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let phase = *self.phase.lock().unwrap();
            if phase != Phase::Registering {
                return self
                    .start_result
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or(Ok(()));
            }
        }

        let services = self.services.lock().unwrap().clone();
        let mut started = Vec::new();
        let mut result = Ok(());

        for service in &services {
            match service.start().await {
                Ok(()) => started.push(service.clone()),
                Err(cause) => {
                    for rolled_back in started.iter().rev() {
                        let _ = rolled_back.stop().await;
                    }
                    result = Err(LifecycleError::StartFailed {
                        name: service.name().to_string(),
                        cause,
                    });
                    break;
                }
            }
        }

        *self.phase.lock().unwrap() = Phase::Started;
        *self.start_result.lock().unwrap() = Some(result.clone());
        result
    }

    /// Stops every registered service in reverse registration order. Always
    /// attempts all services; returns the first error encountered, if any.
    /// Idempotent.
    pub async fn stop(&self) -> Result<(), String> {
        let already_stopped = {
            let mut phase = self.phase.lock().unwrap();
            if *phase == Phase::Stopped {
                true
            } else {
                *phase = Phase::Stopped;
                false
            }
        };
        if already_stopped {
            return Ok(());
        }

        let services = self.services.lock().unwrap().clone();
        let mut first_error = None;
        for service in services.iter().rev() {
            if let Err(e) = service.stop().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Descriptors of every service providing one, sorted by (domain, name).
    /// The returned list is immutable once `start` has run, since
    /// registration is rejected past that point.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        let mut descriptors: Vec<Descriptor> = self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        fail_on_start: bool,
        start_calls: Arc<AtomicUsize>,
        stop_calls: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Lifecycle for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<(), String> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.name);
            if self.fail_on_start {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }

        async fn stop(&self) -> Result<(), String> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_is_atomic_on_failure() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let s1_stops = Arc::new(AtomicUsize::new(0));
        let s3_starts = Arc::new(AtomicUsize::new(0));

        let manager = LifecycleManager::new();
        manager
            .register(Arc::new(Recorder {
                name: "s1",
                fail_on_start: false,
                start_calls: Arc::new(AtomicUsize::new(0)),
                stop_calls: s1_stops.clone(),
                order: order.clone(),
            }))
            .unwrap();
        manager
            .register(Arc::new(Recorder {
                name: "s2",
                fail_on_start: true,
                start_calls: Arc::new(AtomicUsize::new(0)),
                stop_calls: Arc::new(AtomicUsize::new(0)),
                order: order.clone(),
            }))
            .unwrap();
        manager
            .register(Arc::new(Recorder {
                name: "s3",
                fail_on_start: false,
                start_calls: s3_starts.clone(),
                stop_calls: Arc::new(AtomicUsize::new(0)),
                order: order.clone(),
            }))
            .unwrap();

        let result = manager.start().await;
        assert!(result.is_err());
        assert_eq!(s1_stops.load(Ordering::SeqCst), 1);
        assert_eq!(s3_starts.load(Ordering::SeqCst), 0);

        // Stop after a failed start is a no-op returning Ok.
        assert!(manager.stop().await.is_ok());
    }

    #[tokio::test]
    async fn register_after_start_fails() {
        let manager = LifecycleManager::new();
        manager.start().await.unwrap();
        let err = manager
            .register(Arc::new(Recorder {
                name: "late",
                fail_on_start: false,
                start_calls: Arc::new(AtomicUsize::new(0)),
                stop_calls: Arc::new(AtomicUsize::new(0)),
                order: Arc::new(Mutex::new(Vec::new())),
            }))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyStarted));
    }

    #[tokio::test]
    async fn descriptors_sorted_by_domain_then_name() {
        struct WithDescriptor(Descriptor);

        #[async_trait]
        impl Lifecycle for WithDescriptor {
            fn name(&self) -> &str {
                &self.0.name
            }
            async fn start(&self) -> Result<(), String> {
                Ok(())
            }
            async fn stop(&self) -> Result<(), String> {
                Ok(())
            }
            fn descriptor(&self) -> Option<Descriptor> {
                Some(self.0.clone())
            }
        }

        let manager = LifecycleManager::new();
        manager
            .register(Arc::new(WithDescriptor(Descriptor {
                name: "b".into(),
                domain: "zzz".into(),
                layer: "core".into(),
                capabilities: vec![],
                required_apis: vec![],
                version: "1.0.0".into(),
            })))
            .unwrap();
        manager
            .register(Arc::new(WithDescriptor(Descriptor {
                name: "a".into(),
                domain: "aaa".into(),
                layer: "core".into(),
                capabilities: vec![],
                required_apis: vec![],
                version: "1.0.0".into(),
            })))
            .unwrap();

        let descriptors = manager.descriptors();
        assert_eq!(descriptors[0].domain, "aaa");
    }
}
