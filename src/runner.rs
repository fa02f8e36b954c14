//! Launching deploy commands

use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::job::DeployJob;

/// Starts deploy commands without making the caller wait on them.
pub trait DeployRunner: Send + Sync {
    /// Must return immediately; completion and exit status are the runner's concern.
    fn launch(&self, job: DeployJob);
}

/// Runs each command through `sh -c` on a detached tokio task.
///
/// Concurrent jobs are not serialized: two quick pushes to one branch start two processes.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs the job's command to completion and returns its exit status.
    pub async fn run(job: &DeployJob) -> Result<ExitStatus> {
        info!("Job {} - Running: {}", job.id, job.command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&job.command)
            .status()
            .await?;
        Ok(status)
    }
}

impl DeployRunner for ShellRunner {
    fn launch(&self, job: DeployJob) {
        tokio::spawn(async move {
            match ShellRunner::run(&job).await {
                Ok(status) if status.success() => {
                    info!(
                        "Job {} - Deploy for branch '{}' finished successfully.",
                        job.id, job.branch
                    );
                }
                Ok(status) => {
                    warn!(
                        "Job {} - Deploy for branch '{}' exited with {}",
                        job.id, job.branch, status
                    );
                }
                Err(e) => {
                    error!("Job {} - Deploy command failed to start: {}", job.id, e);
                }
            }
        });
    }
}
