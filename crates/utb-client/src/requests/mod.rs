//! Typed test-generation requests
//!
//! Each request kind shapes its own payload and binds to its own method;
//! execution is the same for all of them. [`execute`] sends the call and
//! returns a [`RequestRun`], which hands out [`TestsResponse`] events one at
//! a time and ends in exactly one [`RequestOutcome`].

mod file;
mod folder;
mod line;
mod project;

pub use file::FileRequest;
pub use folder::FolderRequest;
pub use line::{ClassRequest, FunctionRequest, LineRequest};
pub use project::ProjectRequest;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use utb_core::error::ClientError;
use utb_core::TestsResponse;
use utb_protocol::RpcMethod;

use crate::client::{Client, ResponseStream};

/// One kind of generation call
pub trait TestsRequest: Send {
    type Payload: Serialize + Send + Sync;

    fn method(&self) -> RpcMethod;

    fn payload(&self) -> &Self::Payload;

    /// Title shown while the call runs
    fn description(&self) -> &'static str;

    /// Logged when the call is sent
    fn log_message(&self) -> &'static str;

    /// What tests are generated for, e.g. a file name
    fn target_name(&self) -> String;

    fn summary_message(&self, tests_count: u32) -> String {
        let noun = if tests_count == 1 { "test" } else { "tests" };
        format!("{} {} generated for {}", tests_count, noun, self.target_name())
    }

    fn failure_message(&self, error: &ClientError) -> String {
        format!("Failed to generate tests for {}: {}", self.target_name(), error)
    }

    fn cancelled_message(&self) -> String {
        format!("Test generation for {} cancelled", self.target_name())
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RequestOutcome {
    Completed { tests_count: u32, summary: String },
    Failed { message: String, error: ClientError },
    Cancelled { message: String },
}

impl RequestOutcome {
    pub fn message(&self) -> &str {
        match self {
            RequestOutcome::Completed { summary, .. } => summary,
            RequestOutcome::Failed { message, .. } => message,
            RequestOutcome::Cancelled { message } => message,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestOutcome::Cancelled { .. })
    }
}

/// An executing request
///
/// Owns the request, so a request runs at most once.
pub struct RequestRun<R> {
    request: R,
    responses: ResponseStream<TestsResponse>,
    events_delivered: usize,
    tests_count: u32,
    outcome: Option<RequestOutcome>,
}

/// Send `request` over `client`
///
/// Failures never surface here; they end the run with
/// [`RequestOutcome::Failed`].
pub async fn execute<R: TestsRequest>(
    request: R,
    client: &Client,
    cancellation: CancellationToken,
) -> RequestRun<R> {
    tracing::info!(
        client_id = %client.client_id(),
        method = %request.method(),
        target = %request.target_name(),
        "{}",
        request.log_message()
    );

    let responses = client
        .send::<_, TestsResponse>(request.method(), request.payload(), Some(cancellation))
        .await;

    RequestRun {
        request,
        responses,
        events_delivered: 0,
        tests_count: 0,
        outcome: None,
    }
}

impl<R: TestsRequest> RequestRun<R> {
    /// Next event, or `None` once the run has ended
    pub async fn next_event(&mut self) -> Option<TestsResponse> {
        if self.outcome.is_some() {
            return None;
        }

        match self.responses.next().await {
            Some(Ok(event)) => {
                self.events_delivered += 1;
                self.tests_count = self.tests_count.saturating_add(event.tests_count());
                Some(event)
            }
            Some(Err(e)) if e.is_cancellation() => {
                tracing::info!(target = %self.request.target_name(), "Request cancelled");
                self.outcome = Some(RequestOutcome::Cancelled {
                    message: self.request.cancelled_message(),
                });
                None
            }
            Some(Err(error)) => {
                let message = self.request.failure_message(&error);
                tracing::warn!(error = %error, "{}", message);
                self.outcome = Some(RequestOutcome::Failed { message, error });
                None
            }
            None => {
                let summary = self.request.summary_message(self.tests_count);
                tracing::info!(events = self.events_delivered, "{}", summary);
                self.outcome = Some(RequestOutcome::Completed {
                    tests_count: self.tests_count,
                    summary,
                });
                None
            }
        }
    }

    /// The outcome, once the run has ended
    pub fn outcome(&self) -> Option<&RequestOutcome> {
        self.outcome.as_ref()
    }

    pub fn events_delivered(&self) -> usize {
        self.events_delivered
    }

    /// Tests counted across the events delivered so far
    pub fn tests_count(&self) -> u32 {
        self.tests_count
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    /// Drain the remaining events and return the outcome
    pub async fn finish(mut self) -> RequestOutcome {
        loop {
            if let Some(outcome) = self.outcome.take() {
                return outcome;
            }
            let _ = self.next_event().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use utb_core::config::ClientConfig;
    use utb_core::error::ConnectionError;

    fn file_request(path: &str) -> FileRequest {
        FileRequest::build(&ClientConfig::default().project_params(None), PathBuf::from(path))
    }

    #[test]
    fn test_summary_message() {
        let request = file_request("/a/b.cpp");
        assert_eq!(request.summary_message(7), "7 tests generated for b.cpp");
        assert_eq!(request.summary_message(1), "1 test generated for b.cpp");
    }

    #[test]
    fn test_failure_message_names_target() {
        let request = file_request("/a/b.cpp");
        let error = ClientError::Connection(ConnectionError::Disposed);
        let message = request.failure_message(&error);
        assert!(message.starts_with("Failed to generate tests for b.cpp"));
    }

    #[test]
    fn test_outcome_accessors() {
        let done = RequestOutcome::Completed {
            tests_count: 3,
            summary: "3 tests generated for x.c".to_string(),
        };
        let cancelled = RequestOutcome::Cancelled {
            message: "stopped".to_string(),
        };

        assert!(done.is_completed());
        assert_eq!(done.message(), "3 tests generated for x.c");
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_completed());
    }
}
