use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dreamrunner::errors::Result;
use dreamrunner::gateway::{BoxFuture, ContainerRuntimeGateway, LaunchCommand, LaunchRequest};

/// A gateway that runs a shell script instead of a container.
///
/// The script is executed as `sh -c <script> dreamrunner <scratch> <input> <style>`,
/// so it can refer to the scratch directory as `$1`, the input file name as
/// `$2` and the style file name as `$3` (empty for deep dream jobs).
#[derive(Debug)]
pub struct ScriptedGateway {
    script: Mutex<String>,
    ready: AtomicBool,
    teardowns: AtomicUsize,
    launches: Mutex<Vec<LaunchCommand>>,
}

impl ScriptedGateway {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ready: AtomicBool::new(true),
            teardowns: AtomicUsize::new(0),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Script used for the next launches.
    pub fn set_script(&self, script: impl Into<String>) {
        *self.script.lock().unwrap() = script.into();
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> Vec<LaunchCommand> {
        self.launches.lock().unwrap().clone()
    }
}

impl ContainerRuntimeGateway for ScriptedGateway {
    fn launch_command(&self, request: &LaunchRequest<'_>) -> Result<LaunchCommand> {
        let script = self.script.lock().unwrap().clone();
        let command = LaunchCommand::new("sh")
            .arg("-c")
            .arg(script)
            .arg("dreamrunner")
            .arg(request.scratch_dir.to_string_lossy().into_owned())
            .arg(request.input_file)
            .arg(request.style_file.unwrap_or(""));

        self.launches.lock().unwrap().push(command.clone());
        Ok(command)
    }

    fn runtime_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.ready.load(Ordering::SeqCst) })
    }

    fn teardown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
