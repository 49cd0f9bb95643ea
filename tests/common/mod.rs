//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use runcheck::adapters::mock::{MemoryStore, MockPlatform};
use runcheck::domain::models::{Config, HostEnv, RelaunchPlan, TestRunInput};
use runcheck::domain::ports::{Notification, Notifier, Relauncher};
use runcheck::harness::DeclarativeLoader;
use runcheck::services::{CheckpointHub, OrchestratorSettings, RunOrchestrator};
use runcheck::{EngineResult, SessionDeps, TestSession};

pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        poll_interval: Duration::from_millis(1),
        input_settle: Duration::ZERO,
        ..Default::default()
    }
}

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.engine.poll_interval_ms = 1;
    config.engine.input_settle_ms = 0;
    config
}

pub async fn orchestrator(
    platform: &Arc<MockPlatform>,
    store: &Arc<MemoryStore>,
    settings: OrchestratorSettings,
) -> Arc<RunOrchestrator> {
    RunOrchestrator::start(
        platform.clone(),
        store.clone(),
        Arc::new(CheckpointHub::new()),
        settings,
    )
    .await
}

/// Notifier and relauncher that only record what they were asked to do.
#[derive(Default)]
pub struct Recorder {
    pub notifications: Mutex<Vec<Notification>>,
    pub plans: Mutex<Vec<RelaunchPlan>>,
}

#[async_trait]
impl Notifier for Recorder {
    async fn notify(&self, notification: &Notification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}

#[async_trait]
impl Relauncher for Recorder {
    async fn relaunch(&self, plan: &RelaunchPlan) -> EngineResult<()> {
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

pub fn session(
    platform: &Arc<MockPlatform>,
    store: &Arc<MemoryStore>,
    recorder: &Arc<Recorder>,
    input: TestRunInput,
) -> TestSession {
    let deps = SessionDeps {
        platform: platform.clone(),
        store: store.clone(),
        notifier: recorder.clone(),
        relauncher: recorder.clone(),
        loader: Arc::new(DeclarativeLoader::new()),
        checkpoints: Arc::new(CheckpointHub::new()),
    };
    TestSession::new(fast_config(), input, HostEnv::default(), deps)
}
