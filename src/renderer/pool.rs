//! 命令录制器池模块
//!
//! 跨帧复用命令录制器，避免每帧重新绑定原生命令缓冲区的分配开销。
//! 借鉴 DistEngine 的双缓冲帧资源设计。
//!
//! # 设计原则
//!
//! - **代际分区**：空闲录制器按"本帧归还"与"上一帧归还"分成两个不相交分区，
//!   双代是保证 GPU 消费完毕后 CPU 才复用底层存储的最小深度
//! - **围栏门控**：只有分区水位线（该代提交过的最大围栏值）被确认后，其中的
//!   录制器才允许再次取出；未确认时宁可新建也不等待
//! - **无锁并发**：分区是无锁队列，多个工作线程可以同时取出/归还而无需外部加锁
//!
//! # 使用场景
//!
//! ```ignore
//! let pool = CommandRecorderPool::new(QueueKind::Graphics);
//! let mut recorder = pool.get(device, true)?;
//! // ... 录制命令 ...
//! pool.recycle(device, recorder, true)?;
//! pool.prepare_new_frame(); // 帧边界轮换代际
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use tracing::{debug, trace, warn};

use crate::core::config::Config;
use crate::core::error::Result;
use super::backend_trait::{CommandDevice, QueueKind};
use super::command::CommandRecorder;
use super::sync::{Fence, FenceValue};

/// 单个代际分区
struct Generation {
    /// 空闲录制器（无锁队列，支持并发取出/归还）
    idle: SegQueue<CommandRecorder>,
    /// 本代提交过的最大围栏值（水位线）
    watermark: AtomicU64,
}

impl Generation {
    fn new() -> Self {
        Self {
            idle: SegQueue::new(),
            watermark: AtomicU64::new(0),
        }
    }
}

/// 命令录制器池
///
/// 每个队列一个实例，在设备初始化时创建，作为显式参数传入渲染调用点。
/// 录制器惰性创建，直到池销毁前不会释放。
pub struct CommandRecorderPool {
    /// 所属队列
    queue: QueueKind,
    /// 队列完成围栏（池内所有录制器共享）
    fence: Arc<Fence>,
    /// 两个代际分区
    generations: [Generation; 2],
    /// 当前接收归还的分区索引
    active: AtomicUsize,
    /// 创建过的录制器总数
    created: AtomicUsize,
    /// 是否为录制器生成调试名称
    debug_names: bool,
}

impl CommandRecorderPool {
    /// 创建新的录制器池
    pub fn new(queue: QueueKind) -> Self {
        Self {
            queue,
            fence: Arc::new(Fence::new(queue)),
            generations: [Generation::new(), Generation::new()],
            active: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            debug_names: true,
        }
    }

    /// 按配置创建录制器池
    ///
    /// `pool.warm_recorders` 个录制器被预先创建并放入可复用分区，
    /// 摊平首帧的分配峰值。
    pub fn from_config(
        device: &dyn CommandDevice,
        queue: QueueKind,
        config: &Config,
    ) -> Result<Self> {
        let mut pool = Self::new(queue);
        pool.debug_names = config.debug.debug_names;

        for _ in 0..config.pool.warm_recorders {
            let recorder = pool.create_recorder(device)?;
            let active = pool.active.load(Ordering::Acquire);
            pool.generations[1 - active].idle.push(recorder);
        }
        if config.pool.warm_recorders > 0 {
            debug!(
                queue = queue.name(),
                count = config.pool.warm_recorders,
                "Warmed up recorder pool"
            );
        }
        Ok(pool)
    }

    /// 所属队列
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// 队列完成围栏
    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// 创建过的录制器总数
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// 当前空闲录制器总数（两个分区之和）
    pub fn available(&self) -> usize {
        self.generations[0].idle.len() + self.generations[1].idle.len()
    }

    /// 取出一个录制器
    ///
    /// 可复用分区（上一代，围栏水位线已确认）有存货时从那里取出并复位；
    /// 否则新建一个原生命令缓冲区。`auto_begin` 为真时立即进入录制状态。
    pub fn get(&self, device: &dyn CommandDevice, auto_begin: bool) -> Result<CommandRecorder> {
        let active = self.active.load(Ordering::Acquire);
        let safe = &self.generations[1 - active];
        let watermark = FenceValue::new(safe.watermark.load(Ordering::Acquire));

        let reusable = if self.fence.is_completed(watermark) {
            safe.idle.pop()
        } else {
            // 水位线未确认：该代还不可复用，回退到新建
            None
        };

        let mut recorder = match reusable {
            Some(mut recorder) => {
                debug_assert!(recorder.is_completed());
                recorder.reset_frame_data();
                trace!(recorder = %recorder.name(), "Reusing pooled recorder");
                recorder
            }
            None => self.create_recorder(device)?,
        };

        if auto_begin {
            recorder.begin(device)?;
        }
        Ok(recorder)
    }

    /// 归还一个录制器
    ///
    /// `auto_end_and_submit` 为真且录制器仍在录制时，先结束并提交。
    /// 归还进入当前代分区——在代际轮换且围栏确认之前它不会被再次取出。
    ///
    /// 提交失败的录制器被丢弃（不入池），错误向上传播；在重新提交成功或
    /// 丢弃之前绝不把它标记为可复用。
    pub fn recycle(
        &self,
        device: &dyn CommandDevice,
        mut recorder: CommandRecorder,
        auto_end_and_submit: bool,
    ) -> Result<()> {
        assert_eq!(
            recorder.queue(),
            self.queue,
            "recorder returned to a pool of a different queue"
        );
        debug_assert!(
            Arc::ptr_eq(recorder.completion_fence(), &self.fence),
            "recorder returned to a pool with a different fence"
        );

        if recorder.is_open() {
            assert!(
                auto_end_and_submit,
                "recorder '{}' returned while still recording",
                recorder.name()
            );
            if let Err(err) = recorder.submit_to_queue(device, None) {
                warn!(
                    recorder = %recorder.name(),
                    error = %err,
                    "Submission failed on recycle; discarding recorder"
                );
                return Err(err);
            }
        }

        let value = recorder.fence_value_on_submit();
        let active = self.active.load(Ordering::Acquire);
        let generation = &self.generations[active];
        generation.watermark.fetch_max(value.value(), Ordering::AcqRel);
        generation.idle.push(recorder);
        Ok(())
    }

    /// 帧边界：轮换代际
    ///
    /// 轮换后，上一帧的归还分区成为可取出的一代。轮询围栏确认它的水位线；
    /// 未确认时只记录警告而不阻塞——`get` 的门控会继续把该代挡住，
    /// 在围栏到位前宁可新建录制器也不提前复用。
    pub fn prepare_new_frame(&self) {
        let active = self.active.load(Ordering::Acquire);
        let rotating_in = &self.generations[active];
        let watermark = FenceValue::new(rotating_in.watermark.load(Ordering::Acquire));

        if !self.fence.is_completed(watermark) {
            warn!(
                queue = self.queue.name(),
                watermark = watermark.value(),
                completed = self.fence.completed_value().value(),
                "Generation rotated before fence confirmation; reuse stays gated"
            );
        }

        self.active.store(1 - active, Ordering::Release);
        trace!(queue = self.queue.name(), "Rotated recorder generations");
    }

    fn create_recorder(&self, device: &dyn CommandDevice) -> Result<CommandRecorder> {
        let id = self.created.fetch_add(1, Ordering::AcqRel);
        let name = if self.debug_names {
            format!("{}-recorder-{}", self.queue.name(), id)
        } else {
            String::new()
        };
        debug!(queue = self.queue.name(), recorder = %name, "Allocating new command recorder");
        CommandRecorder::new(device, self.queue, Arc::clone(&self.fence), name)
    }
}

impl std::fmt::Debug for CommandRecorderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRecorderPool")
            .field("queue", &self.queue)
            .field("created", &self.created())
            .field("available", &self.available())
            .finish()
    }
}
