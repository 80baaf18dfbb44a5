//! Test generation commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::channels::{LogChannel, LogChannelKind, ServerLogChannel, TestFrameworkLogChannel, TracingSink};
use crate::client::Client;
use crate::manager::ClientManager;
use crate::output::{format_progress, format_test_sources, print_error, print_info, print_success, print_warning};
use crate::requests::{
    self, ClassRequest, FileRequest, FolderRequest, FunctionRequest, LineRequest, ProjectRequest,
    RequestOutcome, TestsRequest,
};
use utb_core::config::ClientConfig;

/// What to generate tests for
#[derive(Debug, Clone)]
pub enum GenerateTarget {
    File(PathBuf),
    Folder(PathBuf),
    Project,
    Function { file: PathBuf, line: u32 },
    Line { file: PathBuf, line: u32 },
    Class { file: PathBuf, line: u32 },
}

/// Log channels the CLI attaches to every session
pub fn default_channels(config: &ClientConfig) -> Vec<Arc<dyn LogChannel>> {
    vec![
        Arc::new(ServerLogChannel::new(
            config.server_log_level,
            TracingSink::new(LogChannelKind::ServerLog),
        )),
        Arc::new(TestFrameworkLogChannel::new(TracingSink::new(
            LogChannelKind::TestFrameworkLog,
        ))),
    ]
}

/// Run one generation request; returns whether it completed
pub async fn generate_command(
    config: &ClientConfig,
    target: GenerateTarget,
    build_target: Option<String>,
    cancel: CancellationToken,
) -> Result<bool> {
    let manager = ClientManager::new(config, default_channels(config));
    let client = manager.client();
    let params = config.project_params(build_target);

    tracing::debug!(client_id = %manager.client_id(), endpoint = %client.endpoint(), "Generating tests");

    let outcome = match target {
        GenerateTarget::File(path) => {
            run(FileRequest::build(&params, absolute(&path)?), &client, cancel).await
        }
        GenerateTarget::Folder(path) => {
            run(FolderRequest::build(&params, absolute(&path)?), &client, cancel).await
        }
        GenerateTarget::Project => run(ProjectRequest::build(&params), &client, cancel).await,
        GenerateTarget::Function { file, line } => {
            run(FunctionRequest::build(&params, absolute(&file)?, line), &client, cancel).await
        }
        GenerateTarget::Line { file, line } => {
            run(LineRequest::build(&params, absolute(&file)?, line), &client, cancel).await
        }
        GenerateTarget::Class { file, line } => {
            run(ClassRequest::build(&params, absolute(&file)?, line), &client, cancel).await
        }
    };

    manager.teardown();

    Ok(match outcome {
        RequestOutcome::Completed { summary, .. } => {
            print_success(&summary);
            true
        }
        RequestOutcome::Cancelled { message } => {
            print_warning(&message);
            false
        }
        RequestOutcome::Failed { message, .. } => {
            print_error(&message);
            false
        }
    })
}

async fn run<R: TestsRequest>(request: R, client: &Client, cancel: CancellationToken) -> RequestOutcome {
    print_info(&format!("{}: {}", request.description(), request.target_name()));

    let mut run = requests::execute(request, client, cancel).await;
    while let Some(event) = run.next_event().await {
        if let Some(progress) = &event.progress {
            println!("{}", format_progress(progress));
        }
        if !event.test_sources.is_empty() {
            println!("{}", format_test_sources(&event.test_sources));
        }
    }

    run.finish().await
}

/// The service resolves paths on its side, so relative paths are anchored
/// at the current directory
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}
