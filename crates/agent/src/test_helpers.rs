//! Shared test helpers for agent tests.

use async_trait::async_trait;
use medquery_core::error::{ProviderError, ToolError};
use medquery_core::message::{Message, MessageToolCall};
use medquery_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use medquery_core::response::{Response, RouteDecision};
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use medquery_core::trace::{ConfidenceLevel, Entities, Intent, Trace};
use medquery_knowledge::InMemoryKnowledgeBase;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next scripted result, after an
/// optional delay. Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// A provider whose every call fails.
    pub fn failing() -> Self {
        Self::scripted(vec![Err(ProviderError::Network("connection refused".into()))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let responses = self.responses.lock().unwrap();
        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }
        responses[index].clone()
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A tool with a fixed result and an optional delay.
pub struct StaticTool {
    pub kind: ToolKind,
    pub result: Result<ToolOutput, ToolError>,
    pub delay: Option<Duration>,
}

impl StaticTool {
    pub fn ok(kind: ToolKind, output: &str) -> Self {
        Self {
            kind,
            result: Ok(ToolOutput::ok(output)),
            delay: None,
        }
    }

    pub fn failing(kind: ToolKind, error: ToolError) -> Self {
        Self {
            kind,
            result: Err(error),
            delay: None,
        }
    }

    pub fn slow(kind: ToolKind, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(kind, "late")
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn description(&self) -> &str {
        "Static test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

pub fn seed_kb() -> Arc<InMemoryKnowledgeBase> {
    Arc::new(InMemoryKnowledgeBase::seed().unwrap())
}

/// A minimal fast-path style response.
pub fn sample_response(answer: &str, degraded: bool) -> Response {
    Response {
        success: true,
        answer: answer.into(),
        confidence: 0.95,
        confidence_level: ConfidenceLevel::High,
        route: RouteDecision::fast_path("bare_drug_name"),
        tool_calls: vec![],
        note: None,
        degraded,
        cached: false,
        trace: Trace {
            trace_id: uuid::Uuid::new_v4().to_string(),
            intent: Intent::DrugInfo,
            entities: Entities::new(),
            steps: vec![],
            tool_decisions: vec![],
            tool_calls: vec![],
            summary: "test".into(),
            duration_ms: 1,
            confidence: 0.95,
            confidence_level: ConfidenceLevel::High,
            created_at: chrono::Utc::now(),
        },
    }
}
