//! Tool-calling orchestration loop for the triage assistant.
//!
//! An [`Agent`] owns a conversation transcript, a set of registered
//! [`AgentTool`]s and an [`LlmClient`]. Each user message drives at most
//! `max_steps` model requests; tool calls requested by the model are validated
//! against their JSON schema, executed one at a time and fed back as tool
//! result messages.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use triage_ai::{
    ChatRequest, ChatUsage, LlmClient, Message, MessageRole, StreamDeltaHandler, ToolCall,
    ToolDefinition, TriageAiError,
};

mod tool_bridge;

use crate::tool_bridge::execute_tool_call;

pub const DEFAULT_MAX_STEPS: usize = 10;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
/// Runtime settings for one [`Agent`].
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: String,
    /// Upper bound on model requests per user message.
    pub max_steps: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tool_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-latest".to_string(),
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: None,
            temperature: None,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }
}

/// Output of one tool execution.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use triage_agent::ToolExecutionResult;
///
/// let ok = ToolExecutionResult::ok(json!("done"));
/// assert_eq!(ok.as_text(), "done");
/// assert!(!ok.is_error);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecutionResult {
    pub content: Value,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Converts the payload to text for insertion into a tool message.
    pub fn as_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

#[async_trait]
/// A capability the model may invoke by name.
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    AgentStart,
    AgentEnd {
        new_messages: usize,
        outcome: RunOutcome,
    },
    TurnStart {
        turn: usize,
    },
    TurnEnd {
        turn: usize,
        tool_results: usize,
        request_duration_ms: u64,
        usage: ChatUsage,
        finish_reason: Option<String>,
    },
    MessageAdded {
        message: Message,
    },
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: ToolExecutionResult,
    },
    StepBudgetExhausted {
        max_steps: usize,
    },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Ai(#[from] TriageAiError),
    #[error("conversation has no user message to answer")]
    EmptyConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model produced a reply without further tool calls.
    Completed,
    /// Every allowed model request asked for more tools.
    StepBudgetExhausted,
}

#[derive(Debug, Clone)]
/// Transcript delta and accounting for one user message.
pub struct AgentRun {
    pub outcome: RunOutcome,
    pub new_messages: Vec<Message>,
    pub steps: usize,
    pub usage: ChatUsage,
}

impl AgentRun {
    /// Text of the last assistant message, if any.
    pub fn final_text(&self) -> Option<String> {
        self.new_messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant)
            .map(Message::text_content)
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn AgentTool>,
}

type EventHandler = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

pub struct Agent {
    client: Arc<dyn LlmClient>,
    config: AgentConfig,
    messages: Vec<Message>,
    tools: HashMap<String, RegisteredTool>,
    tool_order: Vec<String>,
    handlers: Vec<EventHandler>,
}

impl Agent {
    /// Creates an agent, seeding the transcript with the system prompt when set.
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let mut messages = Vec::new();
        if !config.system_prompt.trim().is_empty() {
            messages.push(Message::system(config.system_prompt.clone()));
        }
        Self {
            client,
            config,
            messages,
            tools: HashMap::new(),
            tool_order: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Registers a tool; a later registration under the same name replaces the earlier one.
    pub fn register_tool<T>(&mut self, tool: T)
    where
        T: AgentTool + 'static,
    {
        let definition = tool.definition();
        let name = definition.name.clone();
        if !self.tools.contains_key(&name) {
            self.tool_order.push(name.clone());
        }
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                tool: Arc::new(tool),
            },
        );
    }

    pub fn registered_tool_names(&self) -> Vec<String> {
        self.tool_order.clone()
    }

    /// Definitions in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tool_order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|registered| registered.definition.clone())
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends prior conversation turns after the system prompt.
    ///
    /// System messages in `history` are dropped so the configured prompt
    /// stays authoritative.
    pub fn extend_history<I>(&mut self, history: I)
    where
        I: IntoIterator<Item = Message>,
    {
        self.messages.extend(
            history
                .into_iter()
                .filter(|message| message.role != MessageRole::System),
        );
    }

    pub async fn prompt(&mut self, text: impl Into<String>) -> Result<AgentRun, AgentError> {
        self.messages.push(Message::user(text));
        let start_index = self.messages.len().saturating_sub(1);
        self.run_loop(start_index, None).await
    }

    /// Answers the transcript as it stands; the last message must come from the user.
    pub async fn continue_conversation(&mut self) -> Result<AgentRun, AgentError> {
        self.continue_with(None).await
    }

    /// Like [`Agent::continue_conversation`], forwarding assistant text as it arrives.
    pub async fn continue_conversation_with_stream(
        &mut self,
        on_delta: StreamDeltaHandler,
    ) -> Result<AgentRun, AgentError> {
        self.continue_with(Some(on_delta)).await
    }

    async fn continue_with(
        &mut self,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<AgentRun, AgentError> {
        let last_is_user = self
            .messages
            .last()
            .map(|message| message.role == MessageRole::User)
            .unwrap_or(false);
        if !last_is_user {
            return Err(AgentError::EmptyConversation);
        }
        let start_index = self.messages.len();
        self.run_loop(start_index, on_delta).await
    }

    fn emit(&self, event: AgentEvent) {
        for handler in &self.handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        }
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.emit(AgentEvent::MessageAdded { message });
    }

    async fn run_loop(
        &mut self,
        start_index: usize,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<AgentRun, AgentError> {
        self.emit(AgentEvent::AgentStart);
        let mut total_usage = ChatUsage::default();
        let max_steps = self.config.max_steps.max(1);

        for turn in 1..=max_steps {
            self.emit(AgentEvent::TurnStart { turn });

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tools: self.tool_definitions(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let request_started = std::time::Instant::now();
            let response = self
                .client
                .complete_with_stream(request, on_delta.clone())
                .await?;
            let request_duration_ms = request_started.elapsed().as_millis() as u64;
            total_usage.add(&response.usage);

            let assistant = response.message;
            let tool_calls = assistant.tool_calls();
            self.push_message(assistant);

            if tool_calls.is_empty() {
                self.emit(AgentEvent::TurnEnd {
                    turn,
                    tool_results: 0,
                    request_duration_ms,
                    usage: response.usage,
                    finish_reason: response.finish_reason,
                });
                return Ok(self.finish_run(start_index, RunOutcome::Completed, turn, total_usage));
            }

            let tool_results = tool_calls.len();
            for call in tool_calls {
                self.execute_tool_call(call).await;
            }
            self.emit(AgentEvent::TurnEnd {
                turn,
                tool_results,
                request_duration_ms,
                usage: response.usage,
                finish_reason: response.finish_reason,
            });
        }

        tracing::warn!(max_steps, "agent step budget exhausted");
        self.emit(AgentEvent::StepBudgetExhausted { max_steps });
        Ok(self.finish_run(
            start_index,
            RunOutcome::StepBudgetExhausted,
            max_steps,
            total_usage,
        ))
    }

    fn finish_run(
        &self,
        start_index: usize,
        outcome: RunOutcome,
        steps: usize,
        usage: ChatUsage,
    ) -> AgentRun {
        let new_messages = self.messages[start_index.min(self.messages.len())..].to_vec();
        self.emit(AgentEvent::AgentEnd {
            new_messages: new_messages.len(),
            outcome,
        });
        AgentRun {
            outcome,
            new_messages,
            steps,
            usage,
        }
    }

    async fn execute_tool_call(&mut self, call: ToolCall) {
        self.emit(AgentEvent::ToolExecutionStart {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let call_id = call.id.clone();
        let tool_name = call.name.clone();
        let registered = self
            .tools
            .get(&call.name)
            .map(|registered| (registered.definition.clone(), registered.tool.clone()));
        tracing::debug!(tool = %tool_name, registered = registered.is_some(), "executing tool call");
        let result = execute_tool_call(
            call,
            registered,
            Duration::from_millis(self.config.tool_timeout_ms.max(1)),
        )
        .await;

        self.emit(AgentEvent::ToolExecutionEnd {
            tool_call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            result: result.clone(),
        });
        self.push_message(Message::tool_result(
            call_id,
            tool_name,
            result.as_text(),
            result.is_error,
        ));
    }
}
