use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::traits::{DependencyScope, DependencyScopeFactory};
use jobhost_errors::{JobHostError, JobHostResult};

type Instance = Arc<dyn Any + Send + Sync>;
type ScopedFactory = Arc<dyn Fn(&ServiceScope) -> JobHostResult<Instance> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Singleton(Instance),
    Scoped(ScopedFactory),
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// 依赖注入容器：进程级单例 + 每个作用域各自创建的服务
///
/// 在启动阶段通过 `&mut self` 注册，之后以 `Arc` 共享并作为
/// [`DependencyScopeFactory`] 使用。
#[derive(Clone, Default)]
pub struct ServiceContainer {
    registrations: Arc<HashMap<TypeId, Registration>>,
    names: Arc<HashMap<TypeId, &'static str>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.insert::<T>(Registration::Singleton(service));
    }

    /// 注册作用域服务，每个作用域内首次解析时调用工厂创建
    pub fn register_scoped<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceScope) -> JobHostResult<T> + Send + Sync + 'static,
    {
        let factory: ScopedFactory =
            Arc::new(move |scope| factory(scope).map(|service| Arc::new(service) as Instance));
        self.insert::<T>(Registration::Scoped(factory));
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn registered_names(&self) -> Vec<&'static str> {
        self.names.values().copied().collect()
    }

    pub fn create_service_scope(&self) -> ServiceScope {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(scope.id = id, "创建依赖作用域");
        ServiceScope {
            id,
            registrations: Arc::clone(&self.registrations),
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn insert<T: 'static>(&mut self, registration: Registration) {
        Arc::make_mut(&mut self.registrations).insert(TypeId::of::<T>(), registration);
        Arc::make_mut(&mut self.names).insert(TypeId::of::<T>(), type_name::<T>());
    }
}

impl DependencyScopeFactory for ServiceContainer {
    fn create_scope(&self) -> JobHostResult<Box<dyn DependencyScope>> {
        Ok(Box::new(self.create_service_scope()))
    }
}

/// 一次处理器调用所使用的依赖作用域
///
/// 作用域内的服务只创建一次并被缓存；作用域 drop 时全部释放。
pub struct ServiceScope {
    id: u64,
    registrations: Arc<HashMap<TypeId, Registration>>,
    instances: Mutex<HashMap<TypeId, Instance>>,
}

impl ServiceScope {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> JobHostResult<Arc<T>> {
        self.resolve_any(TypeId::of::<T>(), type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| JobHostError::scope_resolution(type_name::<T>()))
    }

    fn cached(&self, type_id: &TypeId) -> Option<Instance> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(type_id)
            .cloned()
    }
}

impl DependencyScope for ServiceScope {
    fn resolve_any(&self, type_id: TypeId, type_name: &'static str) -> JobHostResult<Instance> {
        match self.registrations.get(&type_id) {
            Some(Registration::Singleton(instance)) => Ok(Arc::clone(instance)),
            Some(Registration::Scoped(factory)) => {
                if let Some(instance) = self.cached(&type_id) {
                    return Ok(instance);
                }
                // 工厂可能继续解析其他作用域服务，调用期间不能持有缓存锁
                let created = factory(self)?;
                let mut instances = self
                    .instances
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                Ok(Arc::clone(instances.entry(type_id).or_insert(created)))
            }
            None => Err(JobHostError::scope_resolution(type_name)),
        }
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        let released = self
            .instances
            .get_mut()
            .map(|instances| instances.len())
            .unwrap_or_default();
        debug!(scope.id = self.id, released, "释放依赖作用域");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Clock;

    struct UnitOfWork {
        drops: Arc<AtomicUsize>,
    }

    impl Drop for UnitOfWork {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Repository {
        uow: Arc<UnitOfWork>,
    }

    fn container(drops: Arc<AtomicUsize>) -> ServiceContainer {
        let mut container = ServiceContainer::new();
        container.register_singleton(Arc::new(Clock));
        container.register_scoped(move |_| {
            Ok(UnitOfWork {
                drops: Arc::clone(&drops),
            })
        });
        container.register_scoped(|scope| {
            Ok(Repository {
                uow: scope.get::<UnitOfWork>()?,
            })
        });
        container
    }

    #[test]
    fn test_singleton_is_shared_across_scopes() {
        let container = container(Arc::new(AtomicUsize::new(0)));
        let a = container.create_service_scope().get::<Clock>().unwrap();
        let b = container.create_service_scope().get::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_scoped_instances_are_cached_per_scope() {
        let container = container(Arc::new(AtomicUsize::new(0)));
        let scope = container.create_service_scope();
        let repo = scope.get::<Repository>().unwrap();
        let uow = scope.get::<UnitOfWork>().unwrap();
        assert!(Arc::ptr_eq(&repo.uow, &uow));

        let other = container.create_service_scope();
        let other_uow = other.get::<UnitOfWork>().unwrap();
        assert!(!Arc::ptr_eq(&uow, &other_uow));
    }

    #[test]
    fn test_scope_releases_instances_on_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let container = container(Arc::clone(&drops));
        {
            let scope = container.create_service_scope();
            scope.get::<Repository>().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_service_fails_resolution() {
        let container = ServiceContainer::new();
        let scope = container.create_scope().unwrap();
        let err = match scope.resolve::<Clock>() {
            Err(err) => err,
            Ok(_) => panic!("Expected error for unregistered service"),
        };
        assert!(matches!(err, JobHostError::ScopeResolution { .. }));
        assert!(err.to_string().contains("Clock"));
    }

    #[test]
    fn test_container_bookkeeping() {
        let container = container(Arc::new(AtomicUsize::new(0)));
        assert_eq!(container.len(), 3);
        assert!(container.contains::<Clock>());
        assert!(!container.contains::<String>());
        assert!(container
            .registered_names()
            .iter()
            .any(|name| name.ends_with("Repository")));
    }
}
