//! 软件模拟设备
//!
//! 本模块提供一个纯软件实现的命令设备：命令缓冲区的录制状态、每队列的
//! FIFO 提交列表、围栏信号和队列侧等待都按真实 GPU 队列的语义建模，
//! 但执行由显式的 `poll` 推进。
//!
//! # 使用场景
//!
//! 1. **无头运行**：没有真实图形设备的环境（CI、服务器）
//! 2. **同步测试**：验证屏障批量调用次数、跨队列排序和围栏门控
//! 3. **故障注入**：模拟队列拒绝提交，覆盖提交失败路径

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::core::error::{GraphicsError, Result};
use crate::renderer::backend_trait::{
    CommandDevice, CommandListHandle, QueueKind, ResourceHandle, TransitionDesc,
};
use crate::renderer::sync::{Fence, FenceValue, FenceWait};

/// 单个命令缓冲区的模拟记录
struct ListRecord {
    name: String,
    queue: QueueKind,
    /// 是否处于录制状态
    open: bool,
    /// 本次录制中发出的屏障批次数
    barrier_batches: usize,
    /// 本次录制中收到的全部转换描述符
    transitions: Vec<TransitionDesc>,
}

/// 队列中等待执行的一次提交
struct Submission {
    list: CommandListHandle,
    wait: Option<(Arc<Fence>, FenceValue)>,
    signal: Arc<Fence>,
    value: FenceValue,
}

/// 模拟设备内部状态
struct SimState {
    next_list_id: u64,
    lists: HashMap<CommandListHandle, ListRecord>,
    /// 每队列的 FIFO 提交列表（下标见 `queue_index`）
    queues: [VecDeque<Submission>; 3],
}

/// 软件模拟命令设备
///
/// 提交不会立即执行；调用 `poll` 时按队列 FIFO 顺序推进，队首提交的
/// 队列侧等待未满足时整个队列停住（队首阻塞），与真实硬件队列一致。
pub struct SimDevice {
    state: Mutex<SimState>,
    /// 历史屏障批次总数
    barrier_batches: AtomicUsize,
    /// 历史转换描述符总数
    transitions_recorded: AtomicUsize,
    /// 下一次提交注入失败
    fail_next_submit: AtomicBool,
}

fn queue_index(queue: QueueKind) -> usize {
    match queue {
        QueueKind::Graphics => 0,
        QueueKind::Compute => 1,
        QueueKind::Transfer => 2,
    }
}

impl SimDevice {
    /// 创建新的模拟设备
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_list_id: 0,
                lists: HashMap::new(),
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            }),
            barrier_batches: AtomicUsize::new(0),
            transitions_recorded: AtomicUsize::new(0),
            fail_next_submit: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim device state lock poisoned")
    }

    /// 推进所有队列的执行
    ///
    /// 反复扫描，直到没有任何队列能继续前进（跨队列的围栏依赖链会在一次
    /// 调用内全部解开）。返回本次执行的提交数。
    pub fn poll(&self) -> usize {
        let mut state = self.lock();
        let mut executed = 0;
        loop {
            let mut progressed = false;
            for queue in &mut state.queues {
                while let Some(front) = queue.front() {
                    let ready = front
                        .wait
                        .as_ref()
                        .map_or(true, |(fence, value)| fence.is_completed(*value));
                    if !ready {
                        break;
                    }
                    let submission = queue.pop_front().expect("front just observed");
                    submission.signal.signal(submission.value);
                    trace!(
                        list = submission.list.id(),
                        fence_value = submission.value.value(),
                        "Executed simulated submission"
                    );
                    executed += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        executed
    }

    /// 历史屏障批次总数（每次 `resource_barrier` 调用计一次）
    pub fn barrier_batches(&self) -> usize {
        self.barrier_batches.load(Ordering::Acquire)
    }

    /// 历史转换描述符总数
    pub fn transitions_recorded(&self) -> usize {
        self.transitions_recorded.load(Ordering::Acquire)
    }

    /// 某个命令缓冲区本次录制中的屏障批次数
    pub fn list_barrier_batches(&self, list: CommandListHandle) -> usize {
        self.lock().lists.get(&list).map_or(0, |r| r.barrier_batches)
    }

    /// 某个命令缓冲区本次录制中涉及的资源
    pub fn list_transitioned_resources(&self, list: CommandListHandle) -> Vec<ResourceHandle> {
        self.lock()
            .lists
            .get(&list)
            .map_or_else(Vec::new, |r| r.transitions.iter().map(|t| t.resource).collect())
    }

    /// 某个队列中尚未执行的提交数
    pub fn pending_submissions(&self, queue: QueueKind) -> usize {
        self.lock().queues[queue_index(queue)].len()
    }

    /// 注入一次提交失败
    ///
    /// 下一次 `submit_command_list` 返回错误，之后恢复正常。
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::Release);
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDevice for SimDevice {
    fn create_command_list(&self, queue: QueueKind, name: &str) -> Result<CommandListHandle> {
        let mut state = self.lock();
        state.next_list_id += 1;
        let handle = CommandListHandle::new(state.next_list_id);
        state.lists.insert(
            handle,
            ListRecord {
                name: name.to_string(),
                queue,
                open: false,
                barrier_batches: 0,
                transitions: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn begin_command_list(&self, list: CommandListHandle) -> Result<()> {
        let mut state = self.lock();

        // 在途的缓冲区不允许重置重录
        let in_flight = state
            .queues
            .iter()
            .any(|q| q.iter().any(|s| s.list == list));
        if in_flight {
            return Err(GraphicsError::CommandExecution(format!(
                "Command list {} is still in flight",
                list.id()
            ))
            .into());
        }

        let record = state
            .lists
            .get_mut(&list)
            .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown command list {}", list.id())))?;
        if record.open {
            return Err(GraphicsError::CommandExecution(format!(
                "Command list '{}' is already recording",
                record.name
            ))
            .into());
        }
        record.open = true;
        // 隐式重置：上一轮录制的内容作废
        record.barrier_batches = 0;
        record.transitions.clear();
        Ok(())
    }

    fn end_command_list(&self, list: CommandListHandle) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .lists
            .get_mut(&list)
            .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown command list {}", list.id())))?;
        if !record.open {
            return Err(GraphicsError::CommandExecution(format!(
                "Command list '{}' is not recording",
                record.name
            ))
            .into());
        }
        record.open = false;
        Ok(())
    }

    fn resource_barrier(&self, list: CommandListHandle, transitions: &[TransitionDesc]) -> Result<()> {
        debug_assert!(!transitions.is_empty(), "empty barrier batch");
        let mut state = self.lock();
        let record = state
            .lists
            .get_mut(&list)
            .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown command list {}", list.id())))?;
        if !record.open {
            return Err(GraphicsError::CommandExecution(format!(
                "Barrier recorded into closed command list '{}'",
                record.name
            ))
            .into());
        }
        record.barrier_batches += 1;
        record.transitions.extend_from_slice(transitions);
        self.barrier_batches.fetch_add(1, Ordering::AcqRel);
        self.transitions_recorded
            .fetch_add(transitions.len(), Ordering::AcqRel);
        Ok(())
    }

    fn submit_command_list(
        &self,
        queue: QueueKind,
        list: CommandListHandle,
        wait: Option<&FenceWait>,
        signal: &Arc<Fence>,
        signal_value: FenceValue,
    ) -> Result<()> {
        if self.fail_next_submit.swap(false, Ordering::AcqRel) {
            return Err(GraphicsError::Submission("Injected submission failure".to_string()).into());
        }

        let mut state = self.lock();
        let record = state
            .lists
            .get(&list)
            .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown command list {}", list.id())))?;
        if record.open {
            return Err(GraphicsError::Submission(format!(
                "Command list '{}' submitted while still recording",
                record.name
            ))
            .into());
        }
        if record.queue != queue {
            return Err(GraphicsError::Submission(format!(
                "Command list '{}' was created for the {} queue",
                record.name,
                record.queue.name()
            ))
            .into());
        }

        state.queues[queue_index(queue)].push_back(Submission {
            list,
            wait: wait.map(|w| (Arc::clone(&w.fence), w.value)),
            signal: Arc::clone(signal),
            value: signal_value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_list(device: &SimDevice, queue: QueueKind) -> CommandListHandle {
        let list = device.create_command_list(queue, "test").unwrap();
        device.begin_command_list(list).unwrap();
        list
    }

    #[test]
    fn test_recording_state_validation() {
        let device = SimDevice::new();
        let list = open_list(&device, QueueKind::Graphics);

        // 已在录制中不能重复 begin
        assert!(device.begin_command_list(list).is_err());

        device.end_command_list(list).unwrap();
        // 已关闭不能重复 end
        assert!(device.end_command_list(list).is_err());

        // 未知句柄
        assert!(device.end_command_list(CommandListHandle::new(999)).is_err());
    }

    #[test]
    fn test_barrier_requires_open_list() {
        let device = SimDevice::new();
        let list = open_list(&device, QueueKind::Graphics);
        device.end_command_list(list).unwrap();

        let desc = TransitionDesc {
            resource: ResourceHandle::new(1),
            subresource: crate::renderer::backend_trait::ALL_SUBRESOURCES,
            state_before: crate::renderer::resource::ResourceState::Common,
            state_after: crate::renderer::resource::ResourceState::CopyDest,
            flags: crate::renderer::backend_trait::BarrierFlags::None,
        };
        assert!(device.resource_barrier(list, &[desc]).is_err());
    }

    #[test]
    fn test_submit_rejects_open_list() {
        let device = SimDevice::new();
        let list = open_list(&device, QueueKind::Graphics);
        let fence = Arc::new(Fence::new(QueueKind::Graphics));

        let result = device.submit_command_list(
            QueueKind::Graphics,
            list,
            None,
            &fence,
            FenceValue::new(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fifo_execution_and_signal() {
        let device = SimDevice::new();
        let fence = Arc::new(Fence::new(QueueKind::Graphics));

        let a = open_list(&device, QueueKind::Graphics);
        device.end_command_list(a).unwrap();
        let b = open_list(&device, QueueKind::Graphics);
        device.end_command_list(b).unwrap();

        let v1 = fence.next_value();
        let v2 = fence.next_value();
        device
            .submit_command_list(QueueKind::Graphics, a, None, &fence, v1)
            .unwrap();
        device
            .submit_command_list(QueueKind::Graphics, b, None, &fence, v2)
            .unwrap();
        assert_eq!(device.pending_submissions(QueueKind::Graphics), 2);

        assert_eq!(device.poll(), 2);
        assert_eq!(device.pending_submissions(QueueKind::Graphics), 0);
        assert!(fence.is_completed(v2));
    }

    #[test]
    fn test_head_of_line_blocking() {
        let device = SimDevice::new();
        let fence = Arc::new(Fence::new(QueueKind::Graphics));
        let gate = Arc::new(Fence::new(QueueKind::Transfer));
        let gate_value = gate.next_value();

        let a = open_list(&device, QueueKind::Graphics);
        device.end_command_list(a).unwrap();
        let b = open_list(&device, QueueKind::Graphics);
        device.end_command_list(b).unwrap();

        let v1 = fence.next_value();
        let v2 = fence.next_value();
        let wait = FenceWait::new(Arc::clone(&gate), gate_value);
        device
            .submit_command_list(QueueKind::Graphics, a, Some(&wait), &fence, v1)
            .unwrap();
        device
            .submit_command_list(QueueKind::Graphics, b, None, &fence, v2)
            .unwrap();

        // 队首的等待未满足，后面的提交也不能越过它执行
        assert_eq!(device.poll(), 0);
        assert!(!fence.is_completed(v2));

        gate.signal(gate_value);
        assert_eq!(device.poll(), 2);
        assert!(fence.is_completed(v2));
    }

    #[test]
    fn test_in_flight_list_cannot_be_reset() {
        let device = SimDevice::new();
        let fence = Arc::new(Fence::new(QueueKind::Graphics));

        let list = open_list(&device, QueueKind::Graphics);
        device.end_command_list(list).unwrap();
        let v = fence.next_value();
        device
            .submit_command_list(QueueKind::Graphics, list, None, &fence, v)
            .unwrap();

        assert!(device.begin_command_list(list).is_err());
        device.poll();
        assert!(device.begin_command_list(list).is_ok());
    }

    #[test]
    fn test_fail_next_submit_is_single_shot() {
        let device = SimDevice::new();
        let fence = Arc::new(Fence::new(QueueKind::Graphics));
        let list = open_list(&device, QueueKind::Graphics);
        device.end_command_list(list).unwrap();

        device.fail_next_submit();
        let v = fence.next_value();
        assert!(device
            .submit_command_list(QueueKind::Graphics, list, None, &fence, v)
            .is_err());
        assert!(device
            .submit_command_list(QueueKind::Graphics, list, None, &fence, v)
            .is_ok());
    }
}
