use utb_core::types::ProjectParams;
use utb_protocol::RpcMethod;

use super::TestsRequest;

/// Generate tests for the whole project
#[derive(Debug, Clone)]
pub struct ProjectRequest {
    params: ProjectParams,
}

impl ProjectRequest {
    pub fn build(project_params: &ProjectParams) -> Self {
        Self {
            params: project_params.clone(),
        }
    }
}

impl TestsRequest for ProjectRequest {
    type Payload = ProjectParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateProjectTests
    }

    fn payload(&self) -> &ProjectParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for project"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for project"
    }

    fn target_name(&self) -> String {
        format!("project {}", self.params.project.project_name)
    }
}
