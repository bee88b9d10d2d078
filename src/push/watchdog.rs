//! Background loop draining `pendingTasks`. Same `interval` vs. `Notify`
//! `select!` shape as the slot watchdog.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::{select, spawn, time::interval};
use tracing::debug;

use crate::executor::KeyedExecutor;

use super::processor::PushProcessor;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct PushWatchdogConfig {
    pub tick: Duration,
    pub executor_shards: usize,
    pub executor_queue_size: usize,
}

pub struct PushWatchdog {
    processor: Arc<PushProcessor>,
    config: PushWatchdogConfig,
    executor: KeyedExecutor,
}

impl PushWatchdog {
    pub fn new(processor: Arc<PushProcessor>, config: PushWatchdogConfig) -> Arc<Self> {
        let executor = KeyedExecutor::new(config.executor_shards, config.executor_queue_size);
        Arc::new(Self {
            processor,
            config,
            executor,
        })
    }

    pub fn run(self: &Arc<Self>) {
        let watchdog = self.clone();
        spawn(async move { watchdog.loop_forever().await });
    }

    async fn loop_forever(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick);

        loop {
            select! {
                _ = ticker.tick() => {},
                _ = self.processor.wake.notified() => {},
            }

            self.drain_due();
        }
    }

    fn drain_due(self: &Arc<Self>) {
        let now = now_ms();
        for key in self.processor.due_pending_keys(now) {
            let Some(task) = self.processor.take_pending(&key) else {
                continue;
            };

            let processor = self.processor.clone();
            let job_task = task.clone();
            let addr = key.client_addr.clone();

            let accepted = self.executor.submit(
                &addr,
                Box::pin(async move {
                    processor.commit(job_task).await;
                }),
            );

            if !accepted {
                debug!(%addr, "push executor backpressure, re-queuing for next tick");
                self.processor.return_pending(key, task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssembleType, DataInfoId, RegistrationBase, Scope, Subscriber};
    use crate::push::processor::{NoopPushTransport, PushProcessorConfig};
    use crate::push::task::{PushTask, TaskKey};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn due_task_is_committed_and_pushing_slot_clears() {
        let processor = PushProcessor::new(
            Arc::new(NoopPushTransport),
            PushProcessorConfig {
                retry_max: 3,
                retry_expire_ms: 500,
            },
        );
        let watchdog = PushWatchdog::new(
            processor.clone(),
            PushWatchdogConfig {
                tick: Duration::from_millis(20),
                executor_shards: 2,
                executor_queue_size: 16,
            },
        );
        watchdog.run();

        let subscriber = Arc::new(Subscriber::new(
            RegistrationBase {
                register_id: "s1".into(),
                data_info_id: DataInfoId::new("d1", "g1", ""),
                source_address: "1.1.1.1:1".into(),
                target_address: "2.2.2.2:2".into(),
                version: 1,
                register_timestamp: 1,
            },
            Scope::Global,
            AssembleType::All,
        ));
        let key = TaskKey::new("dc1", "addr1", BTreeSet::from(["s1".to_string()]));
        processor.fire_push(PushTask::new(key, vec![subscriber], vec![], 1, 0, 5, 0, true));

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(processor.pending_len(), 0);
        assert!(!processor.is_pushing("addr1"));
    }
}
