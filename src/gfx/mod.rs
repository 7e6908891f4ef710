//! 图形后端模块
//!
//! 本模块存放 `CommandDevice` 接口的具体实现。同步层自身只依赖接口；
//! 真实的 Vulkan / DirectX 12 适配器由各平台的渲染后端提供，
//! 这里内置一个软件模拟设备：
//!
//! - `sim`：纯软件的队列/围栏模拟，用于无头运行和同步语义测试

pub mod sim;

pub use sim::SimDevice;
