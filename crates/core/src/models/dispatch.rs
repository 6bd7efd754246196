use serde::{Deserialize, Serialize};

/// 消息分发模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// 该类型的每个处理器都收到每条消息
    Broadcast,
    /// 只有第一个注册的处理器收到消息（至多一个消费者处理）
    Queued,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Broadcast => write!(f, "broadcast"),
            DispatchMode::Queued => write!(f, "queued"),
        }
    }
}
