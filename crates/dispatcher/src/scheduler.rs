//! CRON任务调度器
//!
//! 每个已配置且已注册执行体的任务运行在独立的循环中：
//! 计算下一次触发时间，按轮询间隔休眠直到到期，需要时获取该任务的单实例锁，
//! 执行任务，然后以执行完成的时刻为起点重新计算下一次触发时间。
//! 长时间运行的任务因此会跳过错过的触发点，而不是积压补跑。
//!
//! 表达式解析失败只会让该任务进入 `Faulted`，其余任务照常运行。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use jobhost_config::{CronConfig, CronJobSettings};
use jobhost_core::{CronJob, JobContext, JobLoopState};
use jobhost_errors::{JobHostError, JobHostResult};
use jobhost_infrastructure::{JobTracer, MetricsCollector, StructuredLogger};

use crate::clock::{Clock, SystemClock};
use crate::cron_utils::CronSchedule;

type JobStates = Arc<RwLock<HashMap<String, JobLoopState>>>;

pub struct CronScheduler {
    config: CronConfig,
    jobs: Mutex<HashMap<String, Arc<dyn CronJob>>>,
    runners: RwLock<HashMap<String, Arc<JobRunner>>>,
    states: JobStates,
    loops: tokio::sync::Mutex<JoinSet<()>>,
    cancel: Mutex<Option<CancellationToken>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
}

impl CronScheduler {
    pub fn new(config: CronConfig) -> Self {
        Self::with_clock(
            config,
            Arc::new(SystemClock),
            Arc::new(MetricsCollector::new()),
        )
    }

    pub fn with_clock(
        config: CronConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            jobs: Mutex::new(HashMap::new()),
            runners: RwLock::new(HashMap::new()),
            states: Arc::new(RwLock::new(HashMap::new())),
            loops: tokio::sync::Mutex::new(JoinSet::new()),
            cancel: Mutex::new(None),
            clock,
            metrics,
        }
    }

    /// 把执行体绑定到同名的任务配置上，需在 `start` 之前调用
    pub fn register_job(&self, job_name: impl Into<String>, job: Arc<dyn CronJob>) {
        let job_name = job_name.into();
        debug!(job.name = %job_name, "注册CRON任务执行体");
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_name, job);
    }

    /// 为每个启用的任务启动独立的调度循环
    pub fn start(&self, shutdown: &CancellationToken) -> JobHostResult<()> {
        let token = {
            let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
            if cancel.is_some() {
                return Err(JobHostError::internal("CRON调度器已经启动"));
            }
            let token = shutdown.child_token();
            *cancel = Some(token.clone());
            token
        };

        if !self.config.enabled {
            info!("CRON调度已禁用");
            return Ok(());
        }

        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut loops = self
            .loops
            .try_lock()
            .map_err(|_| JobHostError::internal("CRON调度循环集合被占用"))?;
        let mut started = 0;

        for settings in &self.config.jobs {
            if !settings.enabled {
                jobs.remove(&settings.job_name);
                info!(job.name = %settings.job_name, "CRON任务已禁用");
                continue;
            }

            // 先解析表达式：无效的调度无论是否注册了执行体都要记录
            let schedule = match CronSchedule::new(&settings.cron_expression) {
                Ok(schedule) => schedule,
                Err(error) => {
                    jobs.remove(&settings.job_name);
                    StructuredLogger::log_invalid_cron(
                        &settings.job_name,
                        &settings.cron_expression,
                        &error,
                    );
                    self.set_state(&settings.job_name, JobLoopState::Faulted(error.to_string()));
                    continue;
                }
            };
            let Some(job) = jobs.remove(&settings.job_name) else {
                warn!(job.name = %settings.job_name, "CRON任务没有注册执行体，跳过");
                continue;
            };
            debug!(
                job.name = %settings.job_name,
                frequency = %schedule.frequency_description(self.clock.now()),
                "CRON任务执行频率"
            );

            let runner = Arc::new(JobRunner::new(
                settings,
                schedule,
                job,
                Arc::clone(&self.states),
                Arc::clone(&self.clock),
                Arc::clone(&self.metrics),
            ));
            self.set_state(&settings.job_name, JobLoopState::Idle);
            self.runners
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(settings.job_name.clone(), Arc::clone(&runner));
            loops.spawn(runner.run_loop(token.clone()));
            started += 1;
        }

        for job_name in jobs.keys() {
            warn!(job.name = %job_name, "执行体没有对应的CRON任务配置，忽略");
        }

        info!(jobs = started, "CRON调度器已启动");
        Ok(())
    }

    /// 停止所有调度循环并等待退出；正在执行的任务会先完成
    pub async fn stop(&self) {
        let token = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(token) = token else {
            return;
        };
        token.cancel();

        let mut loops = self.loops.lock().await;
        while let Some(result) = loops.join_next().await {
            if let Err(join_error) = result {
                warn!(error = %join_error, "CRON调度循环异常退出");
            }
        }
        info!("CRON调度器已停止");
    }

    /// 立即执行一次任务，遵守单实例锁；任务自身的错误只记录不返回
    pub async fn trigger(&self, job_name: &str) -> JobHostResult<()> {
        let runner = self
            .runners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_name)
            .cloned()
            .ok_or_else(|| JobHostError::JobNotFound(job_name.to_string()))?;

        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default();

        info!(job.name = job_name, "手动触发CRON任务");
        let _permit = match runner.acquire_lock(&cancel, false).await {
            Ok(permit) => permit,
            Err(()) => return Ok(()),
        };
        runner.execute(self.clock.now(), &cancel).await;
        Ok(())
    }

    pub fn job_states(&self) -> BTreeMap<String, JobLoopState> {
        self.states
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }

    pub fn job_state(&self, job_name: &str) -> Option<JobLoopState> {
        self.states
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_name)
            .cloned()
    }

    /// 没有任何任务循环遇到致命错误
    pub fn is_healthy(&self) -> bool {
        self.states
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .all(|state| !state.is_faulted())
    }

    fn set_state(&self, job_name: &str, state: JobLoopState) {
        set_state(&self.states, job_name, state);
    }
}

fn set_state(states: &JobStates, job_name: &str, state: JobLoopState) {
    states
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(job_name.to_string(), state);
}

/// 单个任务的调度循环
struct JobRunner {
    name: String,
    schedule: CronSchedule,
    poll_interval: Duration,
    /// 单实例锁，`lock_single_instance = false` 时为 None
    lock: Option<Arc<Semaphore>>,
    job: Arc<dyn CronJob>,
    /// 正在执行的次数，未加锁的任务可能大于 1
    active: AtomicUsize,
    states: JobStates,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
}

impl JobRunner {
    fn new(
        settings: &CronJobSettings,
        schedule: CronSchedule,
        job: Arc<dyn CronJob>,
        states: JobStates,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            name: settings.job_name.clone(),
            schedule,
            poll_interval: settings.poll_interval(),
            lock: settings
                .lock_single_instance
                .then(|| Arc::new(Semaphore::new(1))),
            job,
            active: AtomicUsize::new(0),
            states,
            clock,
            metrics,
        }
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            job.name = %self.name,
            cron = self.schedule.expression(),
            poll_interval_seconds = self.poll_interval.as_secs(),
            lock_single_instance = self.lock.is_some(),
            "CRON任务循环启动"
        );
        let mut overlapping: JoinSet<()> = JoinSet::new();

        loop {
            self.set_state(self.resting_state());
            let Some(next_due) = self.schedule.next_after(self.clock.now()) else {
                warn!(job.name = %self.name, "CRON表达式没有后续触发时间");
                self.set_state(JobLoopState::Faulted("没有后续触发时间".to_string()));
                break;
            };
            StructuredLogger::log_job_next_due(&self.name, next_due);

            while self.clock.now() < next_due {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            if cancel.is_cancelled() {
                self.set_state(JobLoopState::Stopped);
                break;
            }

            self.set_state(JobLoopState::Due);
            if self.lock.is_some() {
                let Ok(_permit) = self.acquire_lock(&cancel, true).await else {
                    self.set_state(JobLoopState::Stopped);
                    break;
                };
                self.set_state(JobLoopState::Running);
                self.execute(next_due, &cancel).await;
            } else {
                while overlapping.try_join_next().is_some() {}
                self.active.fetch_add(1, Ordering::SeqCst);
                self.set_state(JobLoopState::Running);
                let runner = Arc::clone(&self);
                let cancel = cancel.clone();
                overlapping.spawn(async move {
                    runner.execute(next_due, &cancel).await;
                    runner.finish_overlapping_run();
                });
            }
        }

        // 未加锁的执行也在退出前跑完
        while overlapping.join_next().await.is_some() {}
        info!(job.name = %self.name, "CRON任务循环已退出");
    }

    /// 获取单实例锁；未启用锁时直接返回 None，取消时返回 Err
    async fn acquire_lock(
        &self,
        cancel: &CancellationToken,
        track_state: bool,
    ) -> Result<Option<OwnedSemaphorePermit>, ()> {
        let Some(lock) = &self.lock else {
            return Ok(None);
        };
        if let Ok(permit) = Arc::clone(lock).try_acquire_owned() {
            return Ok(Some(permit));
        }

        debug!(job.name = %self.name, "上一次执行尚未结束，等待单实例锁");
        if track_state {
            self.set_state(JobLoopState::WaitingForLock);
        }
        tokio::select! {
            permit = Arc::clone(lock).acquire_owned() => permit.map(Some).map_err(|_| ()),
            _ = cancel.cancelled() => Err(()),
        }
    }

    /// 执行一次任务。执行体在独立任务中运行，panic 与错误一样被记录
    async fn execute(&self, scheduled_at: chrono::DateTime<chrono::Utc>, cancel: &CancellationToken) {
        let context = JobContext::new(
            self.name.clone(),
            scheduled_at,
            self.clock.now(),
            cancel.child_token(),
        );
        let correlation_id = context.correlation_id;
        let span = JobTracer::cron_run_span(&self.name, correlation_id, scheduled_at);

        async {
            StructuredLogger::log_job_started(&self.name, correlation_id, scheduled_at);
            let started = tokio::time::Instant::now();

            let job = Arc::clone(&self.job);
            let result = match tokio::spawn(
                async move { job.execute(context).await }.in_current_span(),
            )
            .await
            {
                Ok(result) => result,
                Err(join_error) => Err(JobHostError::job_failed(join_error.to_string())),
            };

            let elapsed = started.elapsed();
            self.metrics
                .record_cron_run(elapsed.as_secs_f64(), result.is_ok());
            match result {
                Ok(()) => StructuredLogger::log_job_completed(
                    &self.name,
                    correlation_id,
                    elapsed.as_millis() as u64,
                ),
                Err(error) => StructuredLogger::log_job_failed(&self.name, correlation_id, &error),
            }
        }
        .instrument(span)
        .await;
    }

    /// 等待下一次触发时的状态：仍有未加锁的执行在跑时保持 `Running`
    fn resting_state(&self) -> JobLoopState {
        if self.active.load(Ordering::SeqCst) > 0 {
            JobLoopState::Running
        } else {
            JobLoopState::Idle
        }
    }

    fn finish_overlapping_run(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = states.get_mut(&self.name) {
            if *state == JobLoopState::Running {
                *state = JobLoopState::Idle;
            }
        }
    }

    fn set_state(&self, state: JobLoopState) {
        set_state(&self.states, &self.name, state);
    }
}
