use std::path::PathBuf;

use utb_core::types::{file_name, FolderParams, ProjectParams};
use utb_protocol::RpcMethod;

use super::TestsRequest;

/// Generate tests for all sources under a folder
#[derive(Debug, Clone)]
pub struct FolderRequest {
    params: FolderParams,
}

impl FolderRequest {
    pub fn build(project_params: &ProjectParams, folder_path: PathBuf) -> Self {
        Self {
            params: FolderParams {
                project_params: project_params.clone(),
                folder_path,
            },
        }
    }
}

impl TestsRequest for FolderRequest {
    type Payload = FolderParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateFolderTests
    }

    fn payload(&self) -> &FolderParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for folder"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for folder"
    }

    fn target_name(&self) -> String {
        match file_name(&self.params.folder_path) {
            Some(name) => format!("folder {}", name),
            None => "folder".to_string(),
        }
    }
}
