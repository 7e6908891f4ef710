//! 统一的命令设备接口
//!
//! 本模块定义了同步层与原生图形 API（Vulkan, DX12, Metal）之间的唯一边界。
//! 同步层只通过这里声明的不透明句柄和少量原语与底层 API 交互，
//! 不持有任何原生对象，也不关心具体实现。
//!
//! # 设计理念
//!
//! - **抽象化**：隐藏不同图形 API 的实现细节
//! - **统一接口**：提供一致的调用方式
//! - **最小边界**：只暴露资源句柄、命令缓冲区原语、批量屏障提交和围栏信号
//! - **dyn 安全**：可以通过 `&dyn CommandDevice` 注入，方便测试替换
//!
//! # 示例
//!
//! ```ignore
//! // 创建设备实例（通过 trait object）
//! let device: &dyn CommandDevice = &SimDevice::new();
//!
//! // 使用统一接口
//! let list = device.create_command_list(QueueKind::Graphics, "frame")?;
//! device.begin_command_list(list)?;
//! ```

use std::sync::Arc;

use crate::core::error::Result;
use crate::renderer::resource::ResourceState;
use crate::renderer::sync::{Fence, FenceValue, FenceWait};

/// 子资源哨兵值：整个资源的所有子资源共享同一状态
pub const ALL_SUBRESOURCES: u32 = u32::MAX;

/// GPU 资源句柄
///
/// 由原生 API 适配层分配的不透明标识。资源本体（缓冲区、纹理、渲染目标）
/// 归资源管理器所有，同步层只跟踪它的执行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    /// 包装一个原生资源标识
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// 获取内部标识
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// 原生命令缓冲区句柄
///
/// 对应一个可录制的原生命令列表（DX12 的 CommandList / Vulkan 的 CommandBuffer）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListHandle(u64);

impl CommandListHandle {
    /// 包装一个原生命令缓冲区标识
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// 获取内部标识
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// 命令队列类型
///
/// 对应 DistEngine 的 CommandListType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// 图形队列（支持图形、计算、传输）
    Graphics,
    /// 计算队列（支持计算、传输）
    Compute,
    /// 传输队列（仅支持传输）
    Transfer,
}

impl QueueKind {
    /// 获取队列名称
    pub fn name(&self) -> &'static str {
        match self {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
            QueueKind::Transfer => "transfer",
        }
    }
}

/// 屏障标志
///
/// 对应 D3D12 分阶段屏障（split barrier）语义；大多数转换使用 `None`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierFlags {
    /// 完整屏障
    None,
    /// 仅开始阶段
    BeginOnly,
    /// 仅结束阶段
    EndOnly,
}

/// 状态转换描述符
///
/// 批量屏障提交的单元，按原生 API 的 ResourceBarrier 数组元素建模。
#[derive(Debug, Clone, Copy)]
pub struct TransitionDesc {
    /// 目标资源
    pub resource: ResourceHandle,
    /// 子资源索引（`ALL_SUBRESOURCES` 表示整个资源）
    pub subresource: u32,
    /// 转换前状态
    pub state_before: ResourceState,
    /// 转换后状态
    pub state_after: ResourceState,
    /// 屏障标志
    pub flags: BarrierFlags,
}

/// 统一的命令设备接口
///
/// 所有具体的图形后端（如模拟设备、DirectX 12、Vulkan 适配器）都必须实现此 trait。
///
/// # 方法说明
///
/// - `create_command_list()`: 分配一个新的原生命令缓冲区
/// - `begin_command_list()`: 进入录制状态（隐式重置缓冲区内容）
/// - `end_command_list()`: 结束录制，缓冲区变为可提交
/// - `resource_barrier()`: 向打开的命令缓冲区录制一次批量状态转换
/// - `submit_command_list()`: 提交到指定队列，队列完成后将围栏推进到给定值
pub trait CommandDevice {
    /// 分配一个新的原生命令缓冲区
    ///
    /// # 参数
    ///
    /// * `queue` - 缓冲区所属的队列类型
    /// * `name` - 调试名称（可为空字符串）
    fn create_command_list(&self, queue: QueueKind, name: &str) -> Result<CommandListHandle>;

    /// 进入录制状态
    ///
    /// 重新进入录制会隐式重置缓冲区之前的内容。
    fn begin_command_list(&self, list: CommandListHandle) -> Result<()>;

    /// 结束录制
    fn end_command_list(&self, list: CommandListHandle) -> Result<()>;

    /// 录制一次批量状态转换屏障
    ///
    /// 每个批次对应原生 API 的一次 `ResourceBarrier` 调用。
    /// 命令缓冲区必须处于录制状态。
    fn resource_barrier(&self, list: CommandListHandle, transitions: &[TransitionDesc]) -> Result<()>;

    /// 提交命令缓冲区到队列
    ///
    /// # 参数
    ///
    /// * `queue` - 目标队列
    /// * `list` - 已结束录制的命令缓冲区
    /// * `wait` - 可选的队列侧等待：队列在围栏到达指定值之前不执行本次提交
    /// * `signal` - 完成围栏，执行完毕后由设备推进
    /// * `signal_value` - 完成时围栏应到达的值
    fn submit_command_list(
        &self,
        queue: QueueKind,
        list: CommandListHandle,
        wait: Option<&FenceWait>,
        signal: &Arc<Fence>,
        signal_value: FenceValue,
    ) -> Result<()>;
}
