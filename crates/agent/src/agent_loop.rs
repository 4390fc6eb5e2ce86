//! The bounded tool-calling loop.
//!
//! One resolution moves through an explicit state machine:
//!
//! ```text
//! Start → AwaitingModel → (ToolRequested → ExecutingTool → AwaitingModel)* → Final
//! ```
//!
//! Tool failures of any kind become `Error: ...` observations for the model.
//! Only the model itself (unavailable, too slow) or the round-trip bound end
//! a resolution early, and those finals are degraded.

use futures::future::join_all;
use medquery_config::{AgentConfig, ModelConfig};
use medquery_core::error::ToolError;
use medquery_core::event::{DomainEvent, EventBus};
use medquery_core::message::{Conversation, Message, MessageToolCall};
use medquery_core::provider::{Provider, ProviderRequest, ToolDefinition};
use medquery_core::query::Query;
use medquery_core::response::ToolCallRecord;
use medquery_core::tool::{ToolCall, ToolKind, ToolOutput, ToolRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::confidence::parse_model_certainty;
use crate::trace_builder::TraceBuilder;

/// Longest excerpt of one tool result quoted in a degraded answer.
const EXCERPT_CHARS: usize = 600;

const SYSTEM_PROMPT: &str = "\
Tu es un assistant pharmaceutique. Tu réponds en français, de façon claire et prudente.

Règles:
- Utilise TOUJOURS les outils pour vérifier les informations avant de répondre. N'invente jamais une donnée sur un médicament.
- Pour une question « X au lieu de Y » ou « remplacer X par Y », appelle compare_medications.
- Pour « quel médicament pour X », appelle search_by_symptom.
- Pour plusieurs médicaments pris ensemble, appelle check_drug_interactions.
- Ne contredis jamais le verdict d'un outil. Si un outil signale un danger, répète-le clairement.
- Si un outil renvoie une erreur, essaie un autre outil ou indique ce qui n'a pas pu être vérifié.
- Termine par une recommandation de consulter un pharmacien ou un médecin si nécessaire.
- Tu peux indiquer ta certitude sur la dernière ligne, par exemple « confidence: 0.8 ».";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model produced a final answer
    Completed,
    /// The model asked for more tools after the last allowed round-trip
    IterationLimit,
    ModelUnavailable,
    ModelTimeout,
}

impl Termination {
    pub fn is_degraded(self) -> bool {
        self != Self::Completed
    }

    /// Explanation attached to degraded responses.
    pub fn note(self) -> Option<&'static str> {
        match self {
            Self::Completed => None,
            Self::IterationLimit => {
                Some("The tool round-trip limit was reached before the model produced an answer")
            }
            Self::ModelUnavailable => Some("The language model was unavailable"),
            Self::ModelTimeout => Some("The language model did not answer in time"),
        }
    }

    fn apology(self) -> &'static str {
        match self {
            Self::Completed => "",
            Self::IterationLimit => {
                "Je n'ai pas pu terminer l'analyse dans la limite d'étapes autorisée."
            }
            Self::ModelUnavailable => "Le service de raisonnement est momentanément indisponible.",
            Self::ModelTimeout => "Le service de raisonnement n'a pas répondu à temps.",
        }
    }
}

/// Everything the loop produced for one query.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    pub termination: Termination,
    /// Tool round-trips performed
    pub round_trips: usize,
    /// Outputs of the tool calls that succeeded, in execution order
    pub outputs: Vec<ToolOutput>,
    pub successful_tools: usize,
    pub failed_tools: usize,
    /// Tools the model asked for, with the reason it gave
    pub requested: BTreeMap<ToolKind, String>,
    /// Certainty the model stated in its final answer
    pub model_certainty: Option<f64>,
}

impl AgentOutcome {
    pub fn degraded(&self) -> bool {
        self.termination.is_degraded()
    }

    pub fn requested_kinds(&self) -> Vec<ToolKind> {
        self.requested.keys().copied().collect()
    }
}

enum LoopState {
    Start,
    AwaitingModel,
    ToolRequested(Vec<MessageToolCall>),
    ExecutingTool(Vec<MessageToolCall>),
    Final(Termination),
}

struct ToolRun {
    call: MessageToolCall,
    arguments: serde_json::Value,
    result: Result<ToolOutput, ToolError>,
    duration_ms: u64,
}

/// Mutable state of one resolution.
#[derive(Default)]
struct Progress {
    conversation: Conversation,
    round_trips: usize,
    final_text: Option<String>,
    outputs: Vec<ToolOutput>,
    successful: usize,
    failed: usize,
    requested: BTreeMap<ToolKind, String>,
}

/// Drives the model and the tools for queries the fast path could not answer.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// Maximum tool round-trips per query
    max_iterations: usize,
    model_timeout: Duration,
    tool_timeout: Duration,
    parallel_tools: bool,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let defaults = AgentConfig::default();
        Self {
            provider,
            tools,
            event_bus,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
            max_iterations: defaults.max_iterations,
            model_timeout: Duration::from_secs(defaults.model_timeout_secs),
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            parallel_tools: defaults.parallel_tools,
        }
    }

    /// Build a loop from the `[model]` and `[agent]` config sections.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        model: &ModelConfig,
        agent: &AgentConfig,
    ) -> Self {
        Self::new(provider, model.model.clone(), tools, event_bus)
            .with_temperature(model.temperature)
            .with_max_tokens(model.max_tokens)
            .with_agent_config(agent)
    }

    pub fn with_agent_config(mut self, agent: &AgentConfig) -> Self {
        self.max_iterations = agent.max_iterations;
        self.model_timeout = Duration::from_secs(agent.model_timeout_secs);
        self.tool_timeout = Duration::from_secs(agent.tool_timeout_secs);
        self.parallel_tools = agent.parallel_tools;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_timeouts(mut self, model: Duration, tool: Duration) -> Self {
        self.model_timeout = model;
        self.tool_timeout = tool;
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    /// Resolve a query, recording every step in `trace`.
    pub async fn resolve(&self, query: &Query, trace: &mut TraceBuilder) -> AgentOutcome {
        let definitions = self.tools.definitions();
        let mut progress = Progress::default();
        let mut state = LoopState::Start;

        let termination = loop {
            state = match state {
                LoopState::Start => {
                    progress.conversation.push(Message::system(SYSTEM_PROMPT));
                    progress.conversation.push(Message::user(query.raw()));
                    trace.step(
                        "plan",
                        format!(
                            "Query needs reasoning; {} tools offered to the model",
                            definitions.len()
                        ),
                        0.5,
                    );
                    LoopState::AwaitingModel
                }
                LoopState::AwaitingModel => {
                    self.await_model(&definitions, &mut progress, trace).await
                }
                LoopState::ToolRequested(calls) => {
                    if progress.round_trips >= self.max_iterations {
                        warn!(
                            trace_id = trace.trace_id(),
                            round_trips = progress.round_trips,
                            "Tool round-trip limit reached"
                        );
                        LoopState::Final(Termination::IterationLimit)
                    } else {
                        let thought = progress
                            .conversation
                            .messages
                            .last()
                            .map(|m| m.content.trim().to_string())
                            .unwrap_or_default();
                        for call in &calls {
                            if let Some(kind) = ToolKind::from_name(&call.name) {
                                let rationale = if thought.is_empty() {
                                    format!("Requested by the model (round {})", progress.round_trips + 1)
                                } else {
                                    thought.clone()
                                };
                                progress.requested.entry(kind).or_insert(rationale);
                            }
                        }
                        LoopState::ExecutingTool(calls)
                    }
                }
                LoopState::ExecutingTool(calls) => {
                    self.execute_tools(calls, &mut progress, trace).await;
                    progress.round_trips += 1;
                    LoopState::AwaitingModel
                }
                LoopState::Final(termination) => break termination,
            };
        };

        trace.decide_tools(&self.tools.kinds(), &progress.requested);
        self.finish(termination, progress, trace)
    }

    async fn await_model(
        &self,
        definitions: &[ToolDefinition],
        progress: &mut Progress,
        trace: &mut TraceBuilder,
    ) -> LoopState {
        debug!(
            trace_id = trace.trace_id(),
            round_trips = progress.round_trips,
            "Calling model"
        );
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: progress.conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: definitions.to_vec(),
        };

        let response = match tokio::time::timeout(self.model_timeout, self.provider.complete(request)).await {
            Err(_) => {
                warn!(
                    trace_id = trace.trace_id(),
                    timeout_secs = self.model_timeout.as_secs(),
                    "Model call timed out"
                );
                trace.step("model_timeout", "The model did not answer in time", 0.2);
                return LoopState::Final(Termination::ModelTimeout);
            }
            Ok(Err(e)) => {
                warn!(trace_id = trace.trace_id(), error = %e, "Model call failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "agent_loop".into(),
                    error_message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                trace.step("model_unavailable", format!("Model call failed: {e}"), 0.2);
                return LoopState::Final(Termination::ModelUnavailable);
            }
            Ok(Ok(response)) => response,
        };

        if response.message.tool_calls.is_empty() {
            trace.step("answer", "The model produced a final answer from the observations", 0.8);
            progress.final_text = Some(response.message.content.clone());
            progress.conversation.push(response.message);
            return LoopState::Final(Termination::Completed);
        }

        let calls = response.message.tool_calls.clone();
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        trace.step(
            "select_tools",
            format!("The model requested {}", names.join(", ")),
            0.7,
        );
        progress.conversation.push(response.message);
        LoopState::ToolRequested(calls)
    }

    async fn run_tool(&self, call: MessageToolCall) -> ToolRun {
        let start = Instant::now();
        let parsed: Result<serde_json::Value, ToolError> = if call.arguments.trim().is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str(&call.arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
        };

        let (arguments, result) = match parsed {
            Ok(arguments) => {
                let tool_call = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: arguments.clone(),
                };
                let result = match tokio::time::timeout(self.tool_timeout, self.tools.execute(&tool_call)).await {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: self.tool_timeout.as_secs(),
                    }),
                };
                (arguments, result)
            }
            Err(e) => (serde_json::Value::String(call.arguments.clone()), Err(e)),
        };

        ToolRun {
            call,
            arguments,
            result,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn execute_tools(
        &self,
        calls: Vec<MessageToolCall>,
        progress: &mut Progress,
        trace: &mut TraceBuilder,
    ) {
        debug!(tool_count = calls.len(), parallel = self.parallel_tools, "Executing tool calls");

        let runs = if self.parallel_tools {
            join_all(calls.into_iter().map(|call| self.run_tool(call))).await
        } else {
            let mut runs = Vec::with_capacity(calls.len());
            for call in calls {
                runs.push(self.run_tool(call).await);
            }
            runs
        };

        // Observations are appended in request order
        for run in runs {
            let rationale = ToolKind::from_name(&run.call.name)
                .and_then(|kind| progress.requested.get(&kind).cloned())
                .unwrap_or_else(|| "Requested by the model".to_string());

            let (observation, success) = match run.result {
                Ok(output) => {
                    let observation = output.output.clone();
                    let success = output.success;
                    if success {
                        progress.successful += 1;
                        progress.outputs.push(output);
                    } else {
                        progress.failed += 1;
                    }
                    (observation, success)
                }
                Err(e) => {
                    warn!(tool = %run.call.name, error = %e, "Tool execution failed");
                    progress.failed += 1;
                    (format!("Error: {e}"), false)
                }
            };

            debug!(tool = %run.call.name, success, duration_ms = run.duration_ms, "Tool executed");
            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: run.call.name.clone(),
                success,
                duration_ms: run.duration_ms,
                timestamp: chrono::Utc::now(),
            });

            trace.step(
                format!("call {}", run.call.name),
                if success {
                    format!("{} returned a result", run.call.name)
                } else {
                    format!("{} failed: {}", run.call.name, observation)
                },
                if success { 0.8 } else { 0.2 },
            );
            trace.record_tool_call(ToolCallRecord {
                tool: run.call.name.clone(),
                arguments: run.arguments,
                result: observation.clone(),
                success,
                rationale,
                confidence: if success { 0.8 } else { 0.2 },
            });

            progress
                .conversation
                .push(Message::tool_result(&run.call.id, observation));
        }
    }

    fn finish(&self, termination: Termination, progress: Progress, trace: &mut TraceBuilder) -> AgentOutcome {
        let answer = match (termination, progress.final_text) {
            (Termination::Completed, Some(text)) if !text.trim().is_empty() => text,
            (termination, _) => {
                if termination == Termination::Completed {
                    warn!(trace_id = trace.trace_id(), "Model returned an empty answer");
                }
                trace.step(
                    "best_effort",
                    format!(
                        "Assembled an answer from {} successful tool results",
                        progress.outputs.len()
                    ),
                    0.3,
                );
                best_effort_answer(termination, &progress.outputs)
            }
        };

        let model_certainty = if termination == Termination::Completed {
            parse_model_certainty(&answer)
        } else {
            None
        };

        info!(
            trace_id = trace.trace_id(),
            termination = ?termination,
            round_trips = progress.round_trips,
            successful_tools = progress.successful,
            failed_tools = progress.failed,
            "Agent loop finished"
        );

        AgentOutcome {
            answer,
            termination,
            round_trips: progress.round_trips,
            outputs: progress.outputs,
            successful_tools: progress.successful,
            failed_tools: progress.failed,
            requested: progress.requested,
            model_certainty,
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}...")
    }
}

/// Answer assembled from verified tool results when the model could not
/// finish.
pub fn best_effort_answer(termination: Termination, outputs: &[ToolOutput]) -> String {
    let mut answer = termination.apology().to_string();
    if answer.is_empty() {
        answer.push_str("Je n'ai pas pu formuler de réponse complète.");
    }

    if outputs.is_empty() {
        answer.push_str(
            " Aucune information n'a pu être vérifiée. Consultez un pharmacien ou un médecin.",
        );
        return answer;
    }

    answer.push_str(" Voici les informations vérifiées dans la base :\n");
    for output in outputs {
        answer.push('\n');
        answer.push_str(&excerpt(&output.output));
        answer.push('\n');
    }
    answer.push_str("\nConsultez un pharmacien ou un médecin pour confirmer.");
    answer
}
