//! 命令录制模块
//!
//! 提供单次使用的命令录制会话，封装不同图形API的命令记录机制。
//! 借鉴 DistEngine 的 CommandList 设计。
//!
//! # 设计原则
//!
//! - **状态机**：`Idle → Open → Executable → Submitted`，命令只能在 `Open`
//!   状态下录制，非法转换直接报错
//! - **围栏绑定**：每个录制器共享所属队列的完成围栏，提交时领取下一个围栏值；
//!   该值被确认前录制器不得复位
//! - **独占所有权**：从池中取出后由单一录制上下文独占，归还后回到池

use std::sync::Arc;

use tracing::trace;

use crate::core::error::{GraphicsError, Result};
use super::backend_trait::{CommandDevice, CommandListHandle, QueueKind};
use super::sync::{Fence, FenceValue, FenceWait};

/// 命令录制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// 空闲，等待开始录制
    Idle,
    /// 正在录制
    Open,
    /// 已结束录制，可提交
    Executable,
    /// 已提交，围栏值已分配
    Submitted,
}

/// 命令录制器
///
/// 绑定一个原生命令缓冲区的单次录制会话。提交后它的围栏值标记了 GPU
/// 何时消费完这批命令；"完成"不是独立状态，而是 `Submitted` 加上围栏确认
/// （见 `is_completed`）。
pub struct CommandRecorder {
    /// 原生命令缓冲区
    list: CommandListHandle,
    /// 所属队列
    queue: QueueKind,
    /// 完成围栏（与所属队列共享）
    fence: Arc<Fence>,
    /// 提交时分配的围栏值（提交前为 INVALID）
    fence_value_on_submit: FenceValue,
    /// 当前状态
    state: RecorderState,
    /// 调试名称
    name: String,
}

impl CommandRecorder {
    /// 创建新的命令录制器
    ///
    /// 分配一个原生命令缓冲区并处于空闲状态。
    pub fn new(
        device: &dyn CommandDevice,
        queue: QueueKind,
        fence: Arc<Fence>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let list = device.create_command_list(queue, &name)?;
        Ok(Self {
            list,
            queue,
            fence,
            fence_value_on_submit: FenceValue::INVALID,
            state: RecorderState::Idle,
            name,
        })
    }

    /// 开始录制
    pub fn begin(&mut self, device: &dyn CommandDevice) -> Result<()> {
        match self.state {
            RecorderState::Idle => {
                device.begin_command_list(self.list)?;
                self.state = RecorderState::Open;
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Recorder '{}' must be idle to begin recording",
                self.name
            ))
            .into()),
        }
    }

    /// 结束录制
    pub fn end(&mut self, device: &dyn CommandDevice) -> Result<()> {
        match self.state {
            RecorderState::Open => {
                device.end_command_list(self.list)?;
                self.state = RecorderState::Executable;
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Recorder '{}' must be open to end recording",
                self.name
            ))
            .into()),
        }
    }

    /// 提交到所属队列
    ///
    /// 仍在录制时会先隐式结束。提交时从队列围栏领取下一个值，由设备在
    /// GPU 消费完本批命令后推进。
    ///
    /// # 参数
    ///
    /// * `wait` - 可选的跨队列等待：本队列在目标围栏到值之前不执行这批命令
    ///   （独立队列间排序依赖工作的机制，如传输队列上传完成后图形队列才可读取）
    ///
    /// # 返回值
    ///
    /// 成功返回分配到的围栏值。提交被队列拒绝时返回错误，录制器保持
    /// `Executable`，可以重试提交或丢弃；预留的围栏值会被归还。
    pub fn submit_to_queue(
        &mut self,
        device: &dyn CommandDevice,
        wait: Option<&FenceWait>,
    ) -> Result<FenceValue> {
        if self.state == RecorderState::Open {
            self.end(device)?;
        }
        if self.state != RecorderState::Executable {
            return Err(GraphicsError::CommandExecution(format!(
                "Recorder '{}' must be open or executable to submit",
                self.name
            ))
            .into());
        }

        let value = self.fence.next_value();
        if let Err(err) = device.submit_command_list(self.queue, self.list, wait, &self.fence, value)
        {
            self.fence.abandon(value);
            return Err(err);
        }

        self.fence_value_on_submit = value;
        self.state = RecorderState::Submitted;
        trace!(
            recorder = %self.name,
            queue = self.queue.name(),
            fence_value = value.value(),
            "Submitted command recorder"
        );
        Ok(value)
    }

    /// 复位帧数据，回到空闲状态
    ///
    /// 仅当分配的围栏值已被确认时合法；提前调用是未定义行为，由断言拦截。
    /// 原生缓冲区的内容在下一次 `begin` 时隐式重置。
    pub fn reset_frame_data(&mut self) {
        assert!(
            self.state != RecorderState::Open,
            "cannot reset recorder '{}' while it is recording",
            self.name
        );
        assert!(
            self.is_completed(),
            "recorder '{}' reset before its fence value {} was signaled",
            self.name,
            self.fence_value_on_submit.value()
        );
        self.state = RecorderState::Idle;
        self.fence_value_on_submit = FenceValue::INVALID;
    }

    /// 是否正在录制
    pub fn is_open(&self) -> bool {
        self.state == RecorderState::Open
    }

    /// 是否已提交
    pub fn is_submitted(&self) -> bool {
        self.state == RecorderState::Submitted
    }

    /// GPU 是否已消费完本录制器上的全部工作
    ///
    /// 已提交时查询围栏；从未提交（空闲或已结束未提交）时没有在途工作，
    /// 恒为真；录制中为假。
    pub fn is_completed(&self) -> bool {
        match self.state {
            RecorderState::Submitted => self.fence.is_completed(self.fence_value_on_submit),
            RecorderState::Open => false,
            RecorderState::Idle | RecorderState::Executable => true,
        }
    }

    /// 当前状态
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// 原生命令缓冲区句柄
    pub fn list(&self) -> CommandListHandle {
        self.list
    }

    /// 所属队列
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// 完成围栏
    pub fn completion_fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// 提交时分配的围栏值（提交前为 INVALID）
    pub fn fence_value_on_submit(&self) -> FenceValue {
        self.fence_value_on_submit
    }

    /// 调试名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CommandRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRecorder")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("state", &self.state)
            .field("fence_value_on_submit", &self.fence_value_on_submit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::sim::SimDevice;

    fn recorder(device: &SimDevice, queue: QueueKind) -> (CommandRecorder, Arc<Fence>) {
        let fence = Arc::new(Fence::new(queue));
        let recorder = CommandRecorder::new(device, queue, Arc::clone(&fence), "test").unwrap();
        (recorder, fence)
    }

    #[test]
    fn test_state_machine_happy_path() {
        let device = SimDevice::new();
        let (mut rec, fence) = recorder(&device, QueueKind::Graphics);

        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.fence_value_on_submit(), FenceValue::INVALID);

        rec.begin(&device).unwrap();
        assert!(rec.is_open());

        rec.end(&device).unwrap();
        assert_eq!(rec.state(), RecorderState::Executable);

        let value = rec.submit_to_queue(&device, None).unwrap();
        assert!(rec.is_submitted());
        assert_eq!(rec.fence_value_on_submit(), value);
        assert!(!rec.is_completed());

        device.poll();
        assert!(fence.is_completed(value));
        assert!(rec.is_completed());

        rec.reset_frame_data();
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.fence_value_on_submit(), FenceValue::INVALID);
    }

    #[test]
    fn test_begin_twice_fails() {
        let device = SimDevice::new();
        let (mut rec, _) = recorder(&device, QueueKind::Graphics);

        rec.begin(&device).unwrap();
        assert!(rec.begin(&device).is_err());
    }

    #[test]
    fn test_end_without_begin_fails() {
        let device = SimDevice::new();
        let (mut rec, _) = recorder(&device, QueueKind::Graphics);

        assert!(rec.end(&device).is_err());
    }

    #[test]
    fn test_submit_implicitly_ends_open_recorder() {
        let device = SimDevice::new();
        let (mut rec, _) = recorder(&device, QueueKind::Graphics);

        rec.begin(&device).unwrap();
        let value = rec.submit_to_queue(&device, None).unwrap();
        assert!(value.is_valid());
        assert!(rec.is_submitted());
    }

    #[test]
    fn test_submit_from_idle_fails() {
        let device = SimDevice::new();
        let (mut rec, _) = recorder(&device, QueueKind::Graphics);

        assert!(rec.submit_to_queue(&device, None).is_err());
    }

    #[test]
    fn test_submit_failure_keeps_recorder_resubmittable() {
        let device = SimDevice::new();
        let (mut rec, fence) = recorder(&device, QueueKind::Graphics);

        rec.begin(&device).unwrap();
        device.fail_next_submit();
        assert!(rec.submit_to_queue(&device, None).is_err());

        // 提交失败：状态回到可提交，预留的围栏值已归还
        assert_eq!(rec.state(), RecorderState::Executable);
        assert_eq!(rec.fence_value_on_submit(), FenceValue::INVALID);
        assert!(!fence.has_outstanding());

        // 重试成功
        let value = rec.submit_to_queue(&device, None).unwrap();
        assert_eq!(value.value(), 1);
    }

    #[test]
    #[should_panic]
    fn test_reset_before_fence_confirmation_panics() {
        let device = SimDevice::new();
        let (mut rec, _) = recorder(&device, QueueKind::Graphics);

        rec.begin(&device).unwrap();
        rec.submit_to_queue(&device, None).unwrap();
        // 没有 poll：围栏未确认
        rec.reset_frame_data();
    }

    #[test]
    fn test_cross_queue_wait_holds_back_execution() {
        let device = SimDevice::new();
        let (mut upload, transfer_fence) = recorder(&device, QueueKind::Transfer);
        let (mut draw, graphics_fence) = recorder(&device, QueueKind::Graphics);

        // 图形队列的提交等待传输围栏；传输工作尚未提交
        draw.begin(&device).unwrap();
        let pending_upload = transfer_fence.last_requested().value() + 1;
        let wait = FenceWait::new(Arc::clone(&transfer_fence), FenceValue::new(pending_upload));
        let draw_value = draw.submit_to_queue(&device, Some(&wait)).unwrap();

        device.poll();
        assert!(!graphics_fence.is_completed(draw_value));

        // 传输队列完成上传后，图形队列的提交才被执行
        upload.begin(&device).unwrap();
        let upload_value = upload.submit_to_queue(&device, None).unwrap();
        assert_eq!(upload_value.value(), pending_upload);

        device.poll();
        assert!(transfer_fence.is_completed(upload_value));
        assert!(graphics_fence.is_completed(draw_value));
    }
}
