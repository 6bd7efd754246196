use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use jobhost_errors::{JobHostError, JobHostResult};

/// 短生命周期的依赖解析上下文
///
/// 作用域在被 drop 时释放其创建的全部实例，失败路径上同样如此。
pub trait DependencyScope: Send + Sync {
    fn resolve_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> JobHostResult<Arc<dyn Any + Send + Sync>>;
}

impl<'a> dyn DependencyScope + 'a {
    /// 按声明类型解析服务实例
    pub fn resolve<T: Send + Sync + 'static>(&self) -> JobHostResult<Arc<T>> {
        let instance = self.resolve_any(TypeId::of::<T>(), type_name::<T>())?;
        instance
            .downcast::<T>()
            .map_err(|_| JobHostError::scope_resolution(type_name::<T>()))
    }
}

pub trait DependencyScopeFactory: Send + Sync {
    fn create_scope(&self) -> JobHostResult<Box<dyn DependencyScope>>;
}
