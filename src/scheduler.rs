use crate::pipeline::{JobRunner, PipelineError};
use crate::vector_sync::VectorSyncService;
use log::{error, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const SYNC_INTERVAL: Duration = Duration::from_secs(1);
pub const PURGE_INTERVAL: Duration = Duration::from_secs(10);

/// 三个后台轮询（job 执行、索引刷新、旧版本清理）的统一生命周期。
/// 进程内构造一次，需要排任务的地方拿引用，不走全局单例
pub struct Scheduler {
    runner: Arc<JobRunner>,
    sync: Arc<VectorSyncService>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runner: Arc<JobRunner>, sync: Arc<VectorSyncService>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runner,
            sync,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        info!(
            "启动后台调度: job 轮询 {:?} / 索引刷新 {:?} / 旧版本清理 {:?}",
            JOB_POLL_INTERVAL, SYNC_INTERVAL, PURGE_INTERVAL
        );

        let runner = self.runner.clone();
        self.handles.push(Self::spawn_loop(
            "job-runner",
            JOB_POLL_INTERVAL,
            self.shutdown_tx.subscribe(),
            move || {
                let runner = runner.clone();
                async move { runner.tick().await.map(|_| ()) }
            },
        ));

        let sync = self.sync.clone();
        self.handles.push(Self::spawn_loop(
            "index-sync",
            SYNC_INTERVAL,
            self.shutdown_tx.subscribe(),
            move || {
                let sync = sync.clone();
                async move { sync.sync_pending().await }
            },
        ));

        let sync = self.sync.clone();
        self.handles.push(Self::spawn_loop(
            "index-purge",
            PURGE_INTERVAL,
            self.shutdown_tx.subscribe(),
            move || {
                let sync = sync.clone();
                async move { sync.purge_stale().await }
            },
        ));
    }

    fn spawn_loop<F, Fut>(
        name: &'static str,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("{} 退出", name);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        // 单次轮询出错只记日志，下个周期照常重试
                        if let Err(e) = tick().await {
                            error!("{} 轮询出错: {}", name, e);
                        }
                    }
                }
            }
        })
    }

    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("后台调度已全部停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::{JobStage, JobStatus, TaskOptions};
    use crate::storage::repository::JobRepository;
    use crate::test_support::{seed_project, seed_task, test_ctx, test_db, StubProvider};
    use crate::vector_sync::VectorSyncService;

    #[tokio::test]
    async fn scheduler_drives_jobs_to_completion_and_stops() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        let provider = Arc::new(StubProvider::new(vec![]));
        let (ctx, _stores) = test_ctx(db, provider);
        let job = JobRepository::create(ctx.db.as_ref(), task.id, JobStage::MatchDoc)
            .await
            .unwrap();

        let runner = Arc::new(JobRunner::new(ctx.clone()));
        let sync = Arc::new(VectorSyncService::new(
            ctx.db.clone(),
            ctx.stores.clone(),
        ));
        let mut scheduler = Scheduler::new(runner, sync);
        scheduler.start();

        // 等过一个轮询周期
        tokio::time::sleep(JOB_POLL_INTERVAL + Duration::from_millis(500)).await;
        scheduler.stop().await;

        let job = JobRepository::find(ctx.db.as_ref(), job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Success);
    }
}
