//! 屏障批处理模块
//!
//! 收集一个录制通道内对多个资源的状态转换请求，在依赖它们的 GPU 操作之前
//! 一次性批量发出。同一资源被触碰 N 次，硬件只看到一个屏障。
//!
//! # 设计原则
//!
//! - **合并**：同一 `(资源, 子资源)` 至多保留一个挂起条目；后续请求原地改写
//!   条目的目标状态，但保留最初的出发状态——对硬件来说只有"本次 flush 前"
//!   到"本次 flush 后"的净变化有意义
//! - **一次提交**：flush 把全部挂起条目组装成一个描述符数组，恰好发出一次
//!   原生屏障调用
//! - **提交后写回**：flush 返回已提交的状态变更，调用方据此更新跟踪器和
//!   任何外部镜像；在真正提交之前不写回
//!
//! 挂起列表用按资源标识的哈希索引定位条目，大批量下仍是常数时间。

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::core::error::Result;
use super::backend_trait::{
    BarrierFlags, CommandDevice, CommandListHandle, ResourceHandle, TransitionDesc,
};
use super::resource::{ResourceState, StateDelta};

/// 挂起的状态转换
#[derive(Debug, Clone, Copy)]
pub struct PendingTransition {
    /// 目标资源
    pub resource: ResourceHandle,
    /// 子资源索引
    pub subresource: u32,
    /// 出发状态（登记该条目时资源的有效状态）
    pub state_before: ResourceState,
    /// 目标状态
    pub state_after: ResourceState,
    /// 屏障标志
    pub flags: BarrierFlags,
    /// 使用后是否在下一次 flush 回到出发状态
    pub toggle: bool,
}

/// 屏障批处理器
///
/// # 示例
///
/// ```ignore
/// let mut batcher = BarrierBatcher::new();
/// tracker.ensure_state(&mut batcher, target, ResourceState::RenderTarget, ALL_SUBRESOURCES, false);
///
/// // 通道边界：一次批量提交，然后写回
/// let deltas = batcher.flush_pending_transitions(device, recorder.list())?;
/// tracker.apply_committed(&deltas);
/// ```
#[derive(Debug)]
pub struct BarrierBatcher {
    /// 挂起转换列表
    pending: Vec<PendingTransition>,
    /// `(资源, 子资源)` 到挂起列表下标的索引
    index: HashMap<(ResourceHandle, u32), usize>,
}

impl BarrierBatcher {
    /// 创建新的批处理器
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// 挂起条目数量
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// 是否没有挂起条目
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 遍历挂起条目
    pub fn pending(&self) -> impl Iterator<Item = &PendingTransition> {
        self.pending.iter()
    }

    /// 查询某个资源的挂起目标状态
    pub fn pending_target(&self, resource: ResourceHandle, subresource: u32) -> Option<ResourceState> {
        self.index
            .get(&(resource, subresource))
            .map(|&i| self.pending[i].state_after)
    }

    /// 登记一个状态转换
    ///
    /// 同一 `(资源, 子资源)` 已有条目时原地改写：目标状态取最新请求，
    /// 出发状态保留最初登记的值。改写后首尾相同的条目直接移除——本批次内
    /// 绕了一圈回到原点，硬件无需任何屏障。
    ///
    /// # Panics
    ///
    /// `state_before == state_after` 的请求是调用方 bug（状态差异应在上游
    /// 经 `ensure_state` 过滤），直接断言失败。
    pub fn add_transition(
        &mut self,
        resource: ResourceHandle,
        state_before: ResourceState,
        state_after: ResourceState,
        subresource: u32,
        flags: BarrierFlags,
        toggle: bool,
    ) {
        assert!(
            state_before != state_after,
            "no-op transition request for resource {} ({} -> {})",
            resource.id(),
            state_before.name(),
            state_after.name()
        );

        let key = (resource, subresource);
        if let Some(&i) = self.index.get(&key) {
            if self.pending[i].state_before == state_after {
                self.remove_at(i);
            } else {
                let entry = &mut self.pending[i];
                entry.state_after = state_after;
                entry.flags = flags;
                entry.toggle = toggle;
            }
        } else {
            self.index.insert(key, self.pending.len());
            self.pending.push(PendingTransition {
                resource,
                subresource,
                state_before,
                state_after,
                flags,
                toggle,
            });
        }
    }

    /// 批量发出全部挂起转换
    ///
    /// 挂起列表为空时不做任何事（也不调用设备）。否则组装一个描述符数组，
    /// 在给定命令缓冲区上恰好发出一次原生屏障调用，返回已提交的状态变更
    /// 供调用方写回。标记了 toggle 的条目会以反向转换重新入队，由下一次
    /// flush 把资源送回静息状态。
    ///
    /// 设备调用失败时挂起列表保持原样，没有任何写回发生。
    pub fn flush_pending_transitions(
        &mut self,
        device: &dyn CommandDevice,
        list: CommandListHandle,
    ) -> Result<Vec<StateDelta>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let descs: Vec<TransitionDesc> = self
            .pending
            .iter()
            .map(|p| TransitionDesc {
                resource: p.resource,
                subresource: p.subresource,
                state_before: p.state_before,
                state_after: p.state_after,
                flags: p.flags,
            })
            .collect();

        device.resource_barrier(list, &descs)?;

        let deltas: Vec<StateDelta> = self
            .pending
            .iter()
            .map(|p| StateDelta {
                resource: p.resource,
                subresource: p.subresource,
                state: p.state_after,
            })
            .collect();

        // toggle 条目反向重新入队：下一次 flush 把它们送回静息状态
        let reverts: Vec<PendingTransition> = self
            .pending
            .iter()
            .filter(|p| p.toggle)
            .map(|p| PendingTransition {
                resource: p.resource,
                subresource: p.subresource,
                state_before: p.state_after,
                state_after: p.state_before,
                flags: p.flags,
                toggle: false,
            })
            .collect();

        self.pending.clear();
        self.index.clear();
        for revert in reverts {
            trace!(
                resource = revert.resource.id(),
                to = revert.state_after.name(),
                "Queued toggle revert"
            );
            self.index
                .insert((revert.resource, revert.subresource), self.pending.len());
            self.pending.push(revert);
        }

        debug!(transitions = descs.len(), "Flushed barrier batch");
        Ok(deltas)
    }

    /// 丢弃全部挂起转换
    ///
    /// 不发出屏障，也不写回。用于放弃一个录制通道（如帧内不可恢复错误），
    /// 避免后续帧的命令缓冲区继承过期的状态假设。
    pub fn clear_pending_transitions(&mut self) {
        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "Cleared pending transitions");
        }
        self.pending.clear();
        self.index.clear();
    }

    fn remove_at(&mut self, i: usize) {
        let removed = self.pending.swap_remove(i);
        self.index.remove(&(removed.resource, removed.subresource));
        if i < self.pending.len() {
            let moved = &self.pending[i];
            self.index.insert((moved.resource, moved.subresource), i);
        }
    }
}

impl Default for BarrierBatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::sim::SimDevice;
    use crate::renderer::backend_trait::{QueueKind, ALL_SUBRESOURCES};

    fn open_list(device: &SimDevice) -> CommandListHandle {
        let list = device.create_command_list(QueueKind::Graphics, "test").unwrap();
        device.begin_command_list(list).unwrap();
        list
    }

    #[test]
    #[should_panic]
    fn test_noop_transition_panics() {
        let mut batcher = BarrierBatcher::new();
        batcher.add_transition(
            ResourceHandle::new(1),
            ResourceState::Common,
            ResourceState::Common,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );
    }

    #[test]
    fn test_merge_keeps_original_before() {
        let mut batcher = BarrierBatcher::new();
        let handle = ResourceHandle::new(1);

        batcher.add_transition(
            handle,
            ResourceState::Common,
            ResourceState::RenderTarget,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );
        batcher.add_transition(
            handle,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );

        assert_eq!(batcher.len(), 1);
        let entry = batcher.pending().next().unwrap();
        assert_eq!(entry.state_before, ResourceState::Common);
        assert_eq!(entry.state_after, ResourceState::ShaderResource);
    }

    #[test]
    fn test_round_trip_merge_removes_entry() {
        let mut batcher = BarrierBatcher::new();
        let handle = ResourceHandle::new(1);

        batcher.add_transition(
            handle,
            ResourceState::Common,
            ResourceState::CopyDest,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );
        batcher.add_transition(
            handle,
            ResourceState::CopyDest,
            ResourceState::Common,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );

        assert!(batcher.is_empty());
        assert_eq!(batcher.pending_target(handle, ALL_SUBRESOURCES), None);
    }

    #[test]
    fn test_subresources_tracked_independently() {
        let mut batcher = BarrierBatcher::new();
        let handle = ResourceHandle::new(1);

        batcher.add_transition(
            handle,
            ResourceState::Common,
            ResourceState::ShaderResource,
            0,
            BarrierFlags::None,
            false,
        );
        batcher.add_transition(
            handle,
            ResourceState::Common,
            ResourceState::CopySource,
            1,
            BarrierFlags::None,
            false,
        );

        assert_eq!(batcher.len(), 2);
        assert_eq!(batcher.pending_target(handle, 0), Some(ResourceState::ShaderResource));
        assert_eq!(batcher.pending_target(handle, 1), Some(ResourceState::CopySource));
    }

    #[test]
    fn test_flush_emits_one_batch_and_writes_back() {
        let device = SimDevice::new();
        let list = open_list(&device);
        let mut batcher = BarrierBatcher::new();

        batcher.add_transition(
            ResourceHandle::new(1),
            ResourceState::Common,
            ResourceState::RenderTarget,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );
        batcher.add_transition(
            ResourceHandle::new(2),
            ResourceState::Common,
            ResourceState::CopyDest,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );

        let deltas = batcher.flush_pending_transitions(&device, list).unwrap();

        assert_eq!(device.barrier_batches(), 1);
        assert_eq!(device.transitions_recorded(), 2);
        assert_eq!(deltas.len(), 2);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_flush_empty_is_silent() {
        let device = SimDevice::new();
        let list = open_list(&device);
        let mut batcher = BarrierBatcher::new();

        let deltas = batcher.flush_pending_transitions(&device, list).unwrap();
        assert!(deltas.is_empty());
        assert_eq!(device.barrier_batches(), 0);
    }

    #[test]
    fn test_clear_then_flush_is_noop() {
        let device = SimDevice::new();
        let list = open_list(&device);
        let mut batcher = BarrierBatcher::new();

        batcher.add_transition(
            ResourceHandle::new(1),
            ResourceState::Common,
            ResourceState::RenderTarget,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            false,
        );
        batcher.clear_pending_transitions();

        let deltas = batcher.flush_pending_transitions(&device, list).unwrap();
        assert!(deltas.is_empty());
        assert_eq!(device.barrier_batches(), 0);
    }

    #[test]
    fn test_toggle_reverts_on_next_flush() {
        let device = SimDevice::new();
        let list = open_list(&device);
        let mut batcher = BarrierBatcher::new();
        let handle = ResourceHandle::new(1);

        batcher.add_transition(
            handle,
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
            ALL_SUBRESOURCES,
            BarrierFlags::None,
            true,
        );

        let deltas = batcher.flush_pending_transitions(&device, list).unwrap();
        assert_eq!(deltas[0].state, ResourceState::RenderTarget);

        // 反向转换已入队，等待下一次 flush
        assert_eq!(batcher.len(), 1);
        assert_eq!(
            batcher.pending_target(handle, ALL_SUBRESOURCES),
            Some(ResourceState::ShaderResource)
        );

        let deltas = batcher.flush_pending_transitions(&device, list).unwrap();
        assert_eq!(deltas[0].state, ResourceState::ShaderResource);
        assert!(batcher.is_empty());
        assert_eq!(device.barrier_batches(), 2);
    }
}
