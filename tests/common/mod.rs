#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dreamrunner::events::EventBus;
use dreamrunner::exec::JobSupervisor;
use dreamrunner::fs::{RealFileSystem, TempResourceLedger};
use dreamrunner::gateway::ContainerRuntimeGateway;
use tempfile::TempDir;

pub use dreamrunner_test_utils::{EventRecorder, ScriptedGateway, init_tracing, with_timeout};

/// A supervisor wired to a [`ScriptedGateway`] and a fresh scratch directory.
pub struct Harness {
    pub supervisor: JobSupervisor,
    pub gateway: Arc<ScriptedGateway>,
    pub events: EventRecorder,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new(script: &str) -> Self {
        Self::with_gateway(Arc::new(ScriptedGateway::new(script)))
    }

    pub fn with_gateway(gateway: Arc<ScriptedGateway>) -> Self {
        init_tracing();
        let scratch = tempfile::tempdir().unwrap();
        let ledger = TempResourceLedger::new(Arc::new(RealFileSystem), scratch.path());
        let bus = EventBus::new();
        let events = EventRecorder::attach(&bus);
        let dyn_gateway: Arc<dyn ContainerRuntimeGateway> = gateway.clone();
        let supervisor = JobSupervisor::new(dyn_gateway, ledger, bus).unwrap();

        Self {
            supervisor,
            gateway,
            events,
            scratch,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Job files currently on disk (the `output/` directory excluded).
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_file())
            .collect()
    }
}
