use serde::{Deserialize, Serialize};

use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageBusConfig {
    /// 处理器失败时是否把消息体序列化进日志
    pub log_message_body: bool,
}

impl ConfigValidator for MessageBusConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        Ok(())
    }
}
