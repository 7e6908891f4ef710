//! GPU 同步机制模块
//!
//! 提供统一的GPU同步原语，用于CPU-GPU同步和队列之间的同步。
//! 借鉴 DistEngine 的 Fence 同步机制设计。
//!
//! # 设计原则
//!
//! - **单调递增**：围栏值只会前进，`last_requested > last_signaled` 表示仍有未完成的 GPU 工作
//! - **非阻塞**：除显式的关机辅助函数外，任何操作都不会挂起调用线程
//! - **每队列一个围栏**：围栏与它所属的设备队列绑定
//!
//! # 使用场景
//!
//! 1. **帧同步**：录制器池确认上一代命令缓冲区已被 GPU 消费完毕
//! 2. **跨队列协作**：图形队列在围栏到值之前不执行依赖传输队列结果的工作

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend_trait::QueueKind;

/// 围栏值
///
/// 用于CPU-GPU同步的单调递增值。
/// CPU可以等待GPU完成特定围栏值对应的工作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 无效值哨兵：录制器在提交之前的围栏值
    pub const INVALID: FenceValue = FenceValue(0);

    /// 创建新的围栏值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 是否为有效值（已经由某次提交分配）
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// 围栏
///
/// 与一个设备队列关联的单调递增完成计数器。
/// CPU 侧通过 `next_value` 请求新值，GPU 侧（设备适配层）在工作完成后
/// 通过 `signal` 推进已完成值。
///
/// # 示例
///
/// ```
/// use dist_rhi::renderer::backend_trait::QueueKind;
/// use dist_rhi::renderer::sync::Fence;
///
/// let fence = Fence::new(QueueKind::Graphics);
/// let v = fence.next_value();
/// assert!(!fence.is_completed(v));
///
/// // 模拟 GPU 完成
/// fence.signal(v);
/// assert!(fence.is_completed(v));
/// ```
#[derive(Debug)]
pub struct Fence {
    /// 所属队列
    queue: QueueKind,
    /// 当前已请求的最大值（CPU侧）
    last_requested: AtomicU64,
    /// 已完成的最大值（GPU侧）
    last_signaled: AtomicU64,
}

impl Fence {
    /// 创建新的围栏
    pub fn new(queue: QueueKind) -> Self {
        Self {
            queue,
            last_requested: AtomicU64::new(0),
            last_signaled: AtomicU64::new(0),
        }
    }

    /// 获取所属队列
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// 获取当前已请求的最大值
    pub fn last_requested(&self) -> FenceValue {
        FenceValue::new(self.last_requested.load(Ordering::Acquire))
    }

    /// 获取已完成的最大值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.last_signaled.load(Ordering::Acquire))
    }

    /// 获取下一个围栏值并递增计数器
    ///
    /// 提交路径在调用设备之前预留该值；提交失败时用 `abandon` 归还。
    pub fn next_value(&self) -> FenceValue {
        let value = self.last_requested.fetch_add(1, Ordering::AcqRel);
        FenceValue::new(value + 1)
    }

    /// 归还一个预留但未能提交的围栏值
    ///
    /// 只有当它仍是最新预留值时才会回退，否则保持原状（之后的预留已经依赖它）。
    /// 返回是否回退成功。
    pub(crate) fn abandon(&self, value: FenceValue) -> bool {
        self.last_requested
            .compare_exchange(value.0, value.0 - 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 推进已完成值
    ///
    /// 由设备适配层在 GPU 完成对应工作后调用。只会向前推进。
    pub fn signal(&self, value: FenceValue) {
        self.last_signaled.fetch_max(value.0, Ordering::AcqRel);
    }

    /// 检查特定围栏值是否已完成
    ///
    /// `FenceValue::INVALID`（从未提交）恒为已完成。
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// 是否仍有未完成的 GPU 工作
    pub fn has_outstanding(&self) -> bool {
        self.last_requested() > self.completed_value()
    }

    /// 等待特定围栏值完成
    ///
    /// 这是一个阻塞操作，只应在关机/析构路径使用；
    /// 帧内的同步一律通过轮询或队列侧等待完成。
    pub fn wait_for_value(&self, value: FenceValue) {
        while !self.is_completed(value) {
            std::thread::yield_now();
        }
    }
}

/// 队列侧等待描述
///
/// 提交时附带：目标队列在 `fence` 到达 `value` 之前不执行本次提交的命令。
/// 这是跨独立队列排序依赖工作的机制（如传输队列上传完成后图形队列才可读取）。
#[derive(Debug, Clone)]
pub struct FenceWait {
    /// 被等待的围栏
    pub fence: Arc<Fence>,
    /// 需要到达的值
    pub value: FenceValue,
}

impl FenceWait {
    /// 创建队列侧等待描述
    pub fn new(fence: Arc<Fence>, value: FenceValue) -> Self {
        Self { fence, value }
    }

    /// 等待条件是否已经满足
    pub fn is_satisfied(&self) -> bool {
        self.fence.is_completed(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_value() {
        let v = FenceValue::new(3);
        assert_eq!(v.value(), 3);
        assert!(v.is_valid());
        assert!(!FenceValue::INVALID.is_valid());
    }

    #[test]
    fn test_fence_monotonic_counter() {
        let fence = Fence::new(QueueKind::Graphics);

        assert_eq!(fence.last_requested().value(), 0);
        assert_eq!(fence.completed_value().value(), 0);
        assert!(!fence.has_outstanding());

        let v1 = fence.next_value();
        assert_eq!(v1.value(), 1);
        let v2 = fence.next_value();
        assert_eq!(v2.value(), 2);
        assert!(fence.has_outstanding());

        // 模拟GPU完成
        fence.signal(v1);
        assert!(fence.is_completed(v1));
        assert!(!fence.is_completed(v2));

        fence.signal(v2);
        assert!(fence.is_completed(v2));
        assert!(!fence.has_outstanding());
    }

    #[test]
    fn test_fence_signal_never_regresses() {
        let fence = Fence::new(QueueKind::Compute);
        let v1 = fence.next_value();
        let v2 = fence.next_value();

        fence.signal(v2);
        // 迟到的低值信号不会把完成值拉回去
        fence.signal(v1);
        assert_eq!(fence.completed_value(), v2);
    }

    #[test]
    fn test_fence_abandon() {
        let fence = Fence::new(QueueKind::Transfer);
        let v1 = fence.next_value();

        // 最新预留值可以归还
        assert!(fence.abandon(v1));
        assert_eq!(fence.last_requested().value(), 0);

        // 有更新的预留之后，旧值无法归还
        let v2 = fence.next_value();
        let v3 = fence.next_value();
        assert!(!fence.abandon(v2));
        assert_eq!(fence.last_requested(), v3);
    }

    #[test]
    fn test_invalid_value_is_trivially_completed() {
        let fence = Fence::new(QueueKind::Graphics);
        assert!(fence.is_completed(FenceValue::INVALID));
    }

    #[test]
    fn test_fence_wait_descriptor() {
        let fence = Arc::new(Fence::new(QueueKind::Transfer));
        let v = fence.next_value();

        let wait = FenceWait::new(Arc::clone(&fence), v);
        assert!(!wait.is_satisfied());

        fence.signal(v);
        assert!(wait.is_satisfied());
    }
}
