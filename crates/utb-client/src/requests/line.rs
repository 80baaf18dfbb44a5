//! Requests anchored at a source position
//!
//! Line, function and class calls share one payload shape; the service
//! resolves the enclosing function or class from the position.

use std::path::PathBuf;

use utb_core::types::{file_name, LineParams, ProjectParams};
use utb_protocol::RpcMethod;

use super::TestsRequest;

fn line_params(project_params: &ProjectParams, file_path: PathBuf, line: u32) -> LineParams {
    LineParams {
        project_params: project_params.clone(),
        file_path,
        line,
    }
}

fn position(params: &LineParams) -> String {
    format!(
        "{}:{}",
        file_name(&params.file_path).unwrap_or("file"),
        params.line
    )
}

/// Generate tests covering one line
#[derive(Debug, Clone)]
pub struct LineRequest {
    params: LineParams,
}

impl LineRequest {
    pub fn build(project_params: &ProjectParams, file_path: PathBuf, line: u32) -> Self {
        Self {
            params: line_params(project_params, file_path, line),
        }
    }
}

impl TestsRequest for LineRequest {
    type Payload = LineParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateLineTests
    }

    fn payload(&self) -> &LineParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for line"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for line"
    }

    fn target_name(&self) -> String {
        format!("line {}", position(&self.params))
    }
}

/// Generate tests for the function enclosing a line
#[derive(Debug, Clone)]
pub struct FunctionRequest {
    params: LineParams,
}

impl FunctionRequest {
    pub fn build(project_params: &ProjectParams, file_path: PathBuf, line: u32) -> Self {
        Self {
            params: line_params(project_params, file_path, line),
        }
    }
}

impl TestsRequest for FunctionRequest {
    type Payload = LineParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateFunctionTests
    }

    fn payload(&self) -> &LineParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for function"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for function"
    }

    fn target_name(&self) -> String {
        format!("function at {}", position(&self.params))
    }
}

/// Generate tests for the class enclosing a line
#[derive(Debug, Clone)]
pub struct ClassRequest {
    params: LineParams,
}

impl ClassRequest {
    pub fn build(project_params: &ProjectParams, file_path: PathBuf, line: u32) -> Self {
        Self {
            params: line_params(project_params, file_path, line),
        }
    }
}

impl TestsRequest for ClassRequest {
    type Payload = LineParams;

    fn method(&self) -> RpcMethod {
        RpcMethod::GenerateClassTests
    }

    fn payload(&self) -> &LineParams {
        &self.params
    }

    fn description(&self) -> &'static str {
        "Generate for class"
    }

    fn log_message(&self) -> &'static str {
        "Sending request to generate tests for class"
    }

    fn target_name(&self) -> String {
        format!("class at {}", position(&self.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utb_core::config::ClientConfig;

    #[test]
    fn test_position_requests_bind_distinct_methods() {
        let params = ClientConfig::default().project_params(None);
        let path = PathBuf::from("/src/shapes.cpp");

        let line = LineRequest::build(&params, path.clone(), 42);
        let function = FunctionRequest::build(&params, path.clone(), 42);
        let class = ClassRequest::build(&params, path, 42);

        assert_eq!(line.method(), RpcMethod::GenerateLineTests);
        assert_eq!(function.method(), RpcMethod::GenerateFunctionTests);
        assert_eq!(class.method(), RpcMethod::GenerateClassTests);
        assert_eq!(line.payload(), function.payload());
        assert_eq!(class.payload().line, 42);
    }

    #[test]
    fn test_position_target_names() {
        let params = ClientConfig::default().project_params(None);
        let request = FunctionRequest::build(&params, PathBuf::from("/src/shapes.cpp"), 7);

        assert_eq!(request.target_name(), "function at shapes.cpp:7");
        assert_eq!(
            request.summary_message(2),
            "2 tests generated for function at shapes.cpp:7"
        );
    }
}
