//! 资源状态跟踪模块
//!
//! 维护每个 GPU 可见资源的执行状态记录，并把状态转换请求延迟到屏障批处理器。
//! 借鉴 DistEngine 的资源状态管理设计。
//!
//! # 设计原则
//!
//! - **乐观延迟**：状态转换不立即发出，而是合并进批处理器，一次 flush 只为
//!   每个资源产生一个屏障
//! - **提交后写回**：`current_state` 只在屏障真正提交后更新，挂起期间它是
//!   陈旧的，查询必须经过 `ensure_state` 路径
//! - **整体或按子资源**：一个资源要么整体跟踪，要么按子资源跟踪，不允许混用

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::core::error::Result;
use super::backend_trait::{
    BarrierFlags, CommandDevice, ResourceHandle, TransitionDesc, ALL_SUBRESOURCES,
};
use super::barrier::BarrierBatcher;
use super::command::CommandRecorder;

/// 资源执行状态
///
/// GPU 当前允许以何种访问方式使用资源。
/// 按 DirectX 12 的 D3D12_RESOURCE_STATES 归类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// 通用状态（刚创建或跨队列移交时）
    Common,
    /// 顶点/常量缓冲区读取
    VertexAndConstantBuffer,
    /// 索引缓冲区读取
    IndexBuffer,
    /// 渲染目标写入
    RenderTarget,
    /// 无序访问（UAV 读写）
    UnorderedAccess,
    /// 深度写入
    DepthWrite,
    /// 深度只读
    DepthRead,
    /// 着色器资源读取
    ShaderResource,
    /// 拷贝源
    CopySource,
    /// 拷贝目标
    CopyDest,
    /// 呈现
    Present,
    /// 通用读取（上传堆资源的固定状态）
    GenericRead,
}

impl ResourceState {
    /// 获取状态名称
    pub fn name(&self) -> &'static str {
        match self {
            ResourceState::Common => "Common",
            ResourceState::VertexAndConstantBuffer => "VertexAndConstantBuffer",
            ResourceState::IndexBuffer => "IndexBuffer",
            ResourceState::RenderTarget => "RenderTarget",
            ResourceState::UnorderedAccess => "UnorderedAccess",
            ResourceState::DepthWrite => "DepthWrite",
            ResourceState::DepthRead => "DepthRead",
            ResourceState::ShaderResource => "ShaderResource",
            ResourceState::CopySource => "CopySource",
            ResourceState::CopyDest => "CopyDest",
            ResourceState::Present => "Present",
            ResourceState::GenericRead => "GenericRead",
        }
    }
}

/// 已提交的状态变更
///
/// `flush` 返回的写回单元：对应资源的某个子资源现在确定处于 `state`。
/// 调用方把它应用到跟踪器（以及任何外部状态镜像）上。
#[derive(Debug, Clone, Copy)]
pub struct StateDelta {
    /// 目标资源
    pub resource: ResourceHandle,
    /// 子资源索引（`ALL_SUBRESOURCES` 表示整个资源）
    pub subresource: u32,
    /// 提交后的状态
    pub state: ResourceState,
}

/// 资源注册描述符
///
/// # 示例
///
/// ```
/// use dist_rhi::renderer::resource::{ResourceDescriptor, ResourceState};
///
/// let desc = ResourceDescriptor::new(ResourceState::Common)
///     .with_subresources(4)
///     .with_shader_visible(true)
///     .with_name("GBuffer0");
/// ```
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// 默认/静息状态：没有操作针对它时回归的状态
    pub generic_state: ResourceState,
    /// 子资源数量（纹理 mip/数组切片），至少为 1
    pub subresource_count: u32,
    /// 是否着色器可见
    pub shader_visible: bool,
    /// 调试名称（可选）
    pub name: Option<String>,
}

impl ResourceDescriptor {
    /// 创建新的资源描述符
    pub fn new(generic_state: ResourceState) -> Self {
        Self {
            generic_state,
            subresource_count: 1,
            shader_visible: false,
            name: None,
        }
    }

    /// 设置子资源数量
    pub fn with_subresources(mut self, count: u32) -> Self {
        self.subresource_count = count;
        self
    }

    /// 设置着色器可见性
    pub fn with_shader_visible(mut self, visible: bool) -> Self {
        self.shader_visible = visible;
        self
    }

    /// 设置调试名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// 已提交状态的存储形式
#[derive(Debug, Clone)]
enum TrackedState {
    /// 所有子资源共享同一状态
    Whole(ResourceState),
    /// 每个子资源独立跟踪
    PerSubresource(Vec<ResourceState>),
}

/// 单个资源的跟踪记录
#[derive(Debug)]
pub struct TrackedResource {
    handle: ResourceHandle,
    name: String,
    generic_state: ResourceState,
    shader_visible: bool,
    subresource_count: u32,
    state: TrackedState,
}

impl TrackedResource {
    /// 资源句柄
    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    /// 调试名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 静息状态
    pub fn generic_state(&self) -> ResourceState {
        self.generic_state
    }

    /// 是否着色器可见
    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    /// 子资源数量
    pub fn subresource_count(&self) -> u32 {
        self.subresource_count
    }

    /// 已提交状态查询
    ///
    /// 挂起的转换尚未反映在这里；操作路径必须通过 `ensure_state`。
    fn committed_state(&self, subresource: u32) -> ResourceState {
        match &self.state {
            TrackedState::Whole(state) => {
                assert!(
                    subresource == ALL_SUBRESOURCES,
                    "resource '{}' is tracked as a whole; use ALL_SUBRESOURCES",
                    self.name
                );
                *state
            }
            TrackedState::PerSubresource(states) => {
                assert!(
                    subresource != ALL_SUBRESOURCES,
                    "resource '{}' is tracked per-subresource; ALL_SUBRESOURCES is no longer valid",
                    self.name
                );
                states[subresource as usize]
            }
        }
    }

    fn set_committed_state(&mut self, subresource: u32, state: ResourceState) {
        match &mut self.state {
            TrackedState::Whole(current) => {
                assert!(
                    subresource == ALL_SUBRESOURCES,
                    "resource '{}' is tracked as a whole; use ALL_SUBRESOURCES",
                    self.name
                );
                *current = state;
            }
            TrackedState::PerSubresource(states) => {
                assert!(
                    subresource != ALL_SUBRESOURCES,
                    "resource '{}' is tracked per-subresource; ALL_SUBRESOURCES is no longer valid",
                    self.name
                );
                states[subresource as usize] = state;
            }
        }
    }
}

/// 资源状态跟踪器
///
/// 每个渲染线程上下文持有一个实例，通过引用传入调用点；不存在全局单例。
/// 同一资源在一帧内只允许一个录制通道对其发起转换，跨通道的并发访问
/// 必须由上游的渲染图依赖排序。
#[derive(Debug)]
pub struct ResourceStateTracker {
    resources: HashMap<ResourceHandle, TrackedResource>,
    debug_names: bool,
}

impl ResourceStateTracker {
    /// 创建新的跟踪器
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            debug_names: true,
        }
    }

    /// 按配置创建跟踪器
    pub fn from_config(debug: &crate::core::config::DebugConfig) -> Self {
        Self {
            resources: HashMap::new(),
            debug_names: debug.debug_names,
        }
    }

    /// 注册资源
    ///
    /// 初始提交状态为描述符的静息状态。重复注册同一句柄是调用方 bug。
    pub fn register(&mut self, handle: ResourceHandle, desc: ResourceDescriptor) {
        assert!(
            desc.subresource_count >= 1,
            "resource must have at least one subresource"
        );
        let name = if self.debug_names {
            desc.name.unwrap_or_else(|| format!("resource-{}", handle.id()))
        } else {
            String::new()
        };
        debug!(
            resource = %name,
            state = desc.generic_state.name(),
            subresources = desc.subresource_count,
            "Registered resource"
        );
        let previous = self.resources.insert(
            handle,
            TrackedResource {
                handle,
                name,
                generic_state: desc.generic_state,
                shader_visible: desc.shader_visible,
                subresource_count: desc.subresource_count,
                state: TrackedState::Whole(desc.generic_state),
            },
        );
        assert!(previous.is_none(), "resource handle registered twice");
    }

    /// 注销资源
    ///
    /// 调用方保证没有针对它的挂起转换（通常在帧边界、flush 之后进行）。
    pub fn unregister(&mut self, handle: ResourceHandle) {
        if self.resources.remove(&handle).is_none() {
            warn!(resource = handle.id(), "Unregistered an unknown resource handle");
        }
    }

    /// 是否已注册
    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.resources.contains_key(&handle)
    }

    /// 已注册资源数量
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// 查询资源记录
    pub fn get(&self, handle: ResourceHandle) -> Option<&TrackedResource> {
        self.resources.get(&handle)
    }

    /// 查询已提交状态
    ///
    /// 注意：挂起和提交之间该值是陈旧的；为新操作做决策必须走 `ensure_state`。
    pub fn current_state(&self, handle: ResourceHandle, subresource: u32) -> ResourceState {
        let record = self.record(handle);
        record.committed_state(self.normalize(record, subresource))
    }

    /// 确保资源处于所需状态
    ///
    /// 若有效状态（存在挂起转换时取其目标，否则取已提交状态）已满足要求则
    /// 不做任何事；否则向批处理器登记一个挂起转换，由下一次 flush 批量发出。
    ///
    /// # 参数
    ///
    /// * `batcher` - 接收挂起转换的批处理器
    /// * `handle` - 目标资源
    /// * `required` - 操作需要的状态
    /// * `subresource` - 子资源索引，`ALL_SUBRESOURCES` 表示整体
    /// * `toggle` - 使用后是否在下一次 flush 回到转换前状态（如渲染目标写完
    ///   立即回到着色器可读）
    pub fn ensure_state(
        &mut self,
        batcher: &mut BarrierBatcher,
        handle: ResourceHandle,
        required: ResourceState,
        subresource: u32,
        toggle: bool,
    ) {
        let record = self
            .resources
            .get_mut(&handle)
            .expect("ensure_state on an unregistered resource");
        let subresource = Self::normalize_for(record, subresource);

        // 首次显式子资源请求把整体记录拆分成按子资源跟踪
        if subresource != ALL_SUBRESOURCES {
            if let TrackedState::Whole(shared) = record.state {
                assert!(
                    batcher.pending_target(handle, ALL_SUBRESOURCES).is_none(),
                    "resource '{}' cannot switch tracking granularity with transitions pending",
                    record.name
                );
                record.state =
                    TrackedState::PerSubresource(vec![shared; record.subresource_count as usize]);
            }
        }

        let committed = record.committed_state(subresource);
        let effective = batcher.pending_target(handle, subresource).unwrap_or(committed);
        if effective == required {
            return;
        }

        trace!(
            resource = %record.name,
            from = effective.name(),
            to = required.name(),
            "Deferred state transition"
        );
        batcher.add_transition(handle, effective, required, subresource, BarrierFlags::None, toggle);
    }

    /// 立即发出单资源转换，绕过批处理器
    ///
    /// 只在转换必须先于同一录制通道中其他批处理工作可见时使用（排序逃生舱）。
    /// 调用方契约：该资源当前没有挂起的转换；违反会导致状态损坏，这是上游
    /// 逻辑 bug 而非可恢复错误。
    pub fn transition_immediate(
        &mut self,
        device: &dyn CommandDevice,
        recorder: &CommandRecorder,
        handle: ResourceHandle,
        new_state: ResourceState,
        subresource: u32,
    ) -> Result<()> {
        assert!(
            recorder.is_open(),
            "immediate transition requires an open recorder"
        );
        let record = self
            .resources
            .get_mut(&handle)
            .expect("transition_immediate on an unregistered resource");
        let subresource = Self::normalize_for(record, subresource);

        let before = record.committed_state(subresource);
        assert!(
            before != new_state,
            "no-op immediate transition on resource '{}'",
            record.name
        );

        device.resource_barrier(
            recorder.list(),
            &[TransitionDesc {
                resource: handle,
                subresource,
                state_before: before,
                state_after: new_state,
                flags: BarrierFlags::None,
            }],
        )?;
        record.set_committed_state(subresource, new_state);
        trace!(
            resource = %record.name,
            from = before.name(),
            to = new_state.name(),
            "Immediate state transition"
        );
        Ok(())
    }

    /// 记录隐式状态提升
    ///
    /// 资源的创建操作（如产生它的拷贝）已经把它留在 `state`，首次使用无需
    /// 显式屏障；直接提交该状态，避免一次多余的空转换。
    pub fn set_implicit_promotion(&mut self, handle: ResourceHandle, state: ResourceState) {
        let record = self
            .resources
            .get_mut(&handle)
            .expect("implicit promotion on an unregistered resource");
        match &mut record.state {
            TrackedState::Whole(current) => *current = state,
            TrackedState::PerSubresource(states) => states.fill(state),
        }
        debug!(resource = %record.name, state = state.name(), "Implicit state promotion");
    }

    /// 应用 flush 返回的已提交变更
    ///
    /// 写回只发生在屏障真正提交之后；这是外部状态镜像保持准确的唯一途径。
    pub fn apply_committed(&mut self, deltas: &[StateDelta]) {
        for delta in deltas {
            match self.resources.get_mut(&delta.resource) {
                Some(record) => record.set_committed_state(delta.subresource, delta.state),
                None => {
                    warn!(
                        resource = delta.resource.id(),
                        "Committed delta for an unregistered resource"
                    );
                }
            }
        }
    }

    fn record(&self, handle: ResourceHandle) -> &TrackedResource {
        self.resources
            .get(&handle)
            .expect("query on an unregistered resource")
    }

    fn normalize(&self, record: &TrackedResource, subresource: u32) -> u32 {
        Self::normalize_for(record, subresource)
    }

    /// 单子资源的资源上，显式索引 0 等价于整体
    fn normalize_for(record: &TrackedResource, subresource: u32) -> u32 {
        if record.subresource_count == 1 && subresource == 0 {
            ALL_SUBRESOURCES
        } else {
            assert!(
                subresource == ALL_SUBRESOURCES || subresource < record.subresource_count,
                "subresource index {} out of range for resource '{}'",
                subresource,
                record.name
            );
            subresource
        }
    }
}

impl Default for ResourceStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
