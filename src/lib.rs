//! DistRHI - GPU 命令缓冲与资源状态同步层
//!
//! DistRHI 是 DistRender 引擎家族的资源同步子系统：跟踪每个 GPU 可见资源的
//! 执行状态，在每个 GPU 操作之前批量发出最小数量的状态转换屏障，并在围栏
//! 保证的生命周期下跨帧复用命令缓冲区。
//!
//! # 架构概览
//!
//! ```text
//! ┌──────────────┐
//! │  渲染器调用点  │  应用/渲染图
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │   renderer   │  跟踪器 / 批处理器 / 录制器 / 池 / 围栏
//! └──────┬───────┘
//!        │
//!   ┌────┴─────┐
//!   │          │
//! ┌─▼───┐   ┌──▼──────┐
//! │ sim │   │ 原生适配器│  CommandDevice 实现
//! └─────┘   └─────────┘
//! ```
//!
//! # 模块说明
//!
//! - `core`：核心功能模块（日志、配置、错误处理）
//! - `renderer`：同步组件（资源状态跟踪、屏障批处理、命令录制与池化）
//! - `gfx`：命令设备实现（软件模拟设备）
//!
//! # 使用示例
//!
//! ```
//! use dist_rhi::gfx::SimDevice;
//! use dist_rhi::renderer::{
//!     BarrierBatcher, CommandRecorderPool, QueueKind, ResourceDescriptor, ResourceHandle,
//!     ResourceState, ResourceStateTracker, ALL_SUBRESOURCES,
//! };
//!
//! let device = SimDevice::new();
//! let pool = CommandRecorderPool::new(QueueKind::Graphics);
//! let mut tracker = ResourceStateTracker::new();
//! let mut batcher = BarrierBatcher::new();
//!
//! let texture = ResourceHandle::new(1);
//! tracker.register(texture, ResourceDescriptor::new(ResourceState::Common));
//!
//! let recorder = pool.get(&device, true).unwrap();
//! tracker.ensure_state(&mut batcher, texture, ResourceState::RenderTarget, ALL_SUBRESOURCES, false);
//!
//! let deltas = batcher.flush_pending_transitions(&device, recorder.list()).unwrap();
//! tracker.apply_committed(&deltas);
//!
//! pool.recycle(&device, recorder, true).unwrap();
//! device.poll();
//! pool.prepare_new_frame();
//! ```

pub mod core;
pub mod renderer;
pub mod gfx;
