//! 渲染器同步模块
//!
//! 本模块提供命令缓冲区与资源状态的同步机制，是渲染器与底层图形 API
//! 之间唯一有并发协调和正确性不变量的一层。应用代码通过这里的组件
//! 录制和提交 GPU 工作，而不需要关心具体使用的是哪个图形 API。
//!
//! # 架构设计
//!
//! - `backend_trait`：与原生 API 的唯一边界（不透明句柄 + 批量屏障 + 围栏）
//! - `resource`：资源状态跟踪器，把转换请求延迟进批处理器
//! - `barrier`：屏障批处理器，一次 flush 合并为一个原生屏障调用
//! - `sync`：围栏，单调递增的完成计数器
//! - `command`：命令录制器，单次录制会话的状态机
//! - `pool`：录制器池，围栏门控的双代际复用
//!
//! # 典型流程
//!
//! ```text
//! ┌──────────┐   get    ┌──────────────┐
//! │   Pool   ├─────────▶│   Recorder   │
//! └────▲─────┘          └──────┬───────┘
//!      │ recycle               │ 录制操作
//!      │                ┌──────▼───────┐  ensure_state  ┌─────────┐
//!      │                │   Tracker    ├───────────────▶│ Batcher │
//!      │                └──────────────┘                └────┬────┘
//!      │                                 flush（一次批量屏障）│
//!      └──────────────────────────────────────────────────────┘
//! ```

// 通用同步组件（与具体 API 无关）
pub mod backend_trait;
pub mod resource;
pub mod barrier;
pub mod sync;
pub mod command;
pub mod pool;

pub use backend_trait::{
    BarrierFlags, CommandDevice, CommandListHandle, QueueKind, ResourceHandle, TransitionDesc,
    ALL_SUBRESOURCES,
};
pub use barrier::BarrierBatcher;
pub use command::{CommandRecorder, RecorderState};
pub use pool::CommandRecorderPool;
pub use resource::{ResourceDescriptor, ResourceState, ResourceStateTracker, StateDelta};
pub use sync::{Fence, FenceValue, FenceWait};
