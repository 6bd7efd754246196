//! 单个处理器的有序投递通道
//!
//! 发布方在入队时按顺序领取序号，工作项执行前等待轮到自己的序号。
//! 消费者并发执行工作项时，同一处理器的批次仍按发布顺序依次处理；
//! 不同处理器之间互不等待。
//!
//! 序号被丢弃（入队失败、工作项被取消或放弃）时自动让位，后续序号不会卡住。

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, MutexGuard};

#[derive(Debug, Default)]
struct LaneState {
    next: u64,
    serving: u64,
    /// 未轮到就已释放的序号
    released: BTreeSet<u64>,
}

#[derive(Debug)]
pub struct DeliveryLane {
    state: Mutex<LaneState>,
    reserve: tokio::sync::Mutex<()>,
    serving: watch::Sender<u64>,
}

impl DeliveryLane {
    pub fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            state: Mutex::new(LaneState::default()),
            reserve: tokio::sync::Mutex::new(()),
            serving,
        }
    }

    /// 独占"领取序号并入队"这一步，持有期间其他发布方在此排队
    ///
    /// 序号顺序必须与入队顺序一致。
    pub async fn reserve(&self) -> MutexGuard<'_, ()> {
        self.reserve.lock().await
    }

    pub fn ticket(self: &Arc<Self>) -> LaneTicket {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = state.next;
        state.next += 1;
        LaneTicket {
            lane: Arc::clone(self),
            sequence,
        }
    }

    /// 当前轮到的序号
    pub fn serving(&self) -> u64 {
        *self.serving.borrow()
    }

    fn release(&self, sequence: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if sequence != state.serving {
            state.released.insert(sequence);
            return;
        }
        let mut serving = sequence + 1;
        while state.released.remove(&serving) {
            serving += 1;
        }
        state.serving = serving;
        self.serving.send_replace(serving);
    }
}

impl Default for DeliveryLane {
    fn default() -> Self {
        Self::new()
    }
}

/// 通道中的一个位置，drop 时让出给下一个序号
#[derive(Debug)]
pub struct LaneTicket {
    lane: Arc<DeliveryLane>,
    sequence: u64,
}

impl LaneTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// 等待之前的所有序号完成或被释放
    pub async fn wait_turn(&self) {
        let mut serving = self.lane.serving.subscribe();
        let sequence = self.sequence;
        // 发送端由通道自身持有，不会提前关闭
        let _ = serving.wait_for(|current| *current >= sequence).await;
    }
}

impl Drop for LaneTicket {
    fn drop(&mut self) {
        self.lane.release(self.sequence);
    }
}
