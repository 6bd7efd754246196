//! 消息处理器注册表
//!
//! 按消息类型保存有序的处理器描述符列表。每个类型的列表采用写时复制：
//! 注册和注销会构造新列表再整体替换，查询拿到的永远是完整快照，
//! 不同消息类型之间的写入互不阻塞。
//!
//! 处理器在启动时通过显式注册列表（[`HandlerInstaller`]）装配，不做运行时扫描。

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::delivery_lane::DeliveryLane;
use crate::traits::{DependencyScope, Message, MessageHandler};
use jobhost_errors::JobHostResult;

/// 注册时分配的处理器标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

pub type ScopedResolver<M> = fn(&dyn DependencyScope) -> JobHostResult<Arc<dyn MessageHandler<M>>>;

/// 处理器实例的来源
pub enum HandlerSource<M: Message> {
    /// 进程级单例，直接调用
    Singleton(Arc<dyn MessageHandler<M>>),
    /// 每次调用都在新建的依赖作用域中按类型解析
    Scoped(ScopedResolver<M>),
}

impl<M: Message> Clone for HandlerSource<M> {
    fn clone(&self) -> Self {
        match self {
            HandlerSource::Singleton(handler) => HandlerSource::Singleton(Arc::clone(handler)),
            HandlerSource::Scoped(resolver) => HandlerSource::Scoped(*resolver),
        }
    }
}

fn resolve_scoped<M, H>(scope: &dyn DependencyScope) -> JobHostResult<Arc<dyn MessageHandler<M>>>
where
    M: Message,
    H: MessageHandler<M>,
{
    let handler: Arc<dyn MessageHandler<M>> = scope.resolve::<H>()?;
    Ok(handler)
}

/// 把消息类型和处理器绑定起来的注册记录
pub struct HandlerDescriptor<M: Message> {
    id: HandlerId,
    name: String,
    source: HandlerSource<M>,
    lane: Arc<DeliveryLane>,
}

impl<M: Message> HandlerDescriptor<M> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &HandlerSource<M> {
        &self.source
    }

    /// 该处理器的有序投递通道，分发器按它串行化同一处理器的批次
    pub fn lane(&self) -> &Arc<DeliveryLane> {
        &self.lane
    }

    pub fn requires_scope(&self) -> bool {
        matches!(self.source, HandlerSource::Scoped(_))
    }
}

impl<M: Message> fmt::Debug for HandlerDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("message_type", &M::message_type())
            .field("requires_scope", &self.requires_scope())
            .finish()
    }
}

type HandlerList<M> = Arc<Vec<Arc<HandlerDescriptor<M>>>>;

struct HandlerSlot<M: Message> {
    handlers: RwLock<HandlerList<M>>,
}

impl<M: Message> HandlerSlot<M> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> HandlerList<M> {
        Arc::clone(&self.handlers.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// 基于当前快照构造新列表并整体替换
    fn update<R>(&self, f: impl FnOnce(&mut Vec<Arc<HandlerDescriptor<M>>>) -> R) -> R {
        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut next = (**guard).clone();
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }
}

trait ErasedSlot: Send + Sync {
    fn message_type(&self) -> &'static str;
    fn len(&self) -> usize;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> ErasedSlot for HandlerSlot<M> {
    fn message_type(&self) -> &'static str {
        M::message_type()
    }

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 启动时的显式注册函数
pub type HandlerInstaller = fn(&HandlerRegistry);

/// 线程安全的 消息类型 → 处理器描述符列表 映射
pub struct HandlerRegistry {
    slots: RwLock<HashMap<TypeId, Arc<dyn ErasedSlot>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 依次执行启动注册列表
    pub fn install(&self, installers: &[HandlerInstaller]) {
        for installer in installers {
            installer(self);
        }
        info!(
            message_types = self.registered_message_types().len(),
            "消息处理器注册完成"
        );
    }

    pub fn register<M: Message>(&self, name: impl Into<String>, source: HandlerSource<M>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let descriptor = Arc::new(HandlerDescriptor {
            id,
            name: name.into(),
            source,
            lane: Arc::new(DeliveryLane::new()),
        });
        debug!(
            handler.id = %id,
            handler.name = descriptor.name(),
            message_type = M::message_type(),
            requires_scope = descriptor.requires_scope(),
            "注册消息处理器"
        );
        self.slot_or_create::<M>()
            .update(|handlers| handlers.push(descriptor));
        id
    }

    /// 注册进程级单例处理器
    pub fn register_singleton<M: Message>(&self, handler: Arc<dyn MessageHandler<M>>) -> HandlerId {
        let name = handler.name().to_string();
        self.register(name, HandlerSource::Singleton(handler))
    }

    /// 注册需要在新建依赖作用域中解析的处理器，`H` 必须已在容器中注册
    pub fn register_scoped<M, H>(&self) -> HandlerId
    where
        M: Message,
        H: MessageHandler<M>,
    {
        self.register(type_name::<H>(), HandlerSource::Scoped(resolve_scoped::<M, H>))
    }

    pub fn unregister<M: Message>(&self, id: HandlerId) -> bool {
        let Some(slot) = self.slot::<M>() else {
            return false;
        };
        let removed = slot.update(|handlers| {
            let before = handlers.len();
            handlers.retain(|descriptor| descriptor.id != id);
            before != handlers.len()
        });
        if removed {
            debug!(handler.id = %id, message_type = M::message_type(), "注销消息处理器");
        }
        removed
    }

    /// 按名称注销，返回移除的处理器数量
    pub fn unregister_by_name<M: Message>(&self, name: &str) -> usize {
        let Some(slot) = self.slot::<M>() else {
            return 0;
        };
        slot.update(|handlers| {
            let before = handlers.len();
            handlers.retain(|descriptor| descriptor.name != name);
            before - handlers.len()
        })
    }

    /// 当前处理器列表的快照，按注册顺序排列
    pub fn lookup<M: Message>(&self) -> HandlerList<M> {
        self.slot::<M>()
            .map(|slot| slot.snapshot())
            .unwrap_or_default()
    }

    pub fn handler_count<M: Message>(&self) -> usize {
        self.slot::<M>().map(|slot| slot.snapshot().len()).unwrap_or(0)
    }

    /// 至少有一个处理器的消息类型
    pub fn registered_message_types(&self) -> Vec<&'static str> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let mut types: Vec<_> = slots
            .values()
            .filter(|slot| slot.len() > 0)
            .map(|slot| slot.message_type())
            .collect();
        types.sort_unstable();
        types
    }

    fn slot<M: Message>(&self) -> Option<Arc<HandlerSlot<M>>> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&TypeId::of::<M>())
            .cloned()
            .and_then(|slot| slot.into_any().downcast::<HandlerSlot<M>>().ok())
    }

    fn slot_or_create<M: Message>(&self) -> Arc<HandlerSlot<M>> {
        if let Some(slot) = self.slot::<M>() {
            return slot;
        }
        let erased = {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                slots
                    .entry(TypeId::of::<M>())
                    .or_insert_with(|| Arc::new(HandlerSlot::<M>::new())),
            )
        };
        erased
            .into_any()
            .downcast::<HandlerSlot<M>>()
            .unwrap_or_else(|_| unreachable!("slot keyed by TypeId of its message type"))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
