use std::path::PathBuf;

use utb_core::types::{file_name, FileParams, ProjectParams};
use utb_protocol::RpcMethod;

use super::TestsRequest;

/// Generate tests for every function in one source file
#[derive(Debug, Clone)]
pub struct FileRequest {
    params: FileParams,
}

impl FileRequest {
    pub fn build(project_params: &ProjectParams, file_path: PathBuf) -> Self {
        Self {
            params: FileParams {
                project_params: project_params.clone(),
                file_path,
            },
        }
    }
}

impl TestsRequest for FileRequest {
    type Payload = FileParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateFileTests
    }

    fn payload(&self) -> &FileParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for file"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for file"
    }

    fn target_name(&self) -> String {
        file_name(&self.params.file_path)
            .unwrap_or("file")
            .to_string()
    }
}
