//! Tool-calling conversation endpoint, streamed as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use triage_agent::{Agent, AgentConfig, AgentError, AgentEvent, AgentRun};
use triage_ai::{ContentBlock, Message, MessageRole, StreamDeltaHandler, ToolCall};
use triage_tools::register_triage_tools;

use crate::error::ApiError;
use crate::prompt::triage_system_prompt;
use crate::routes::parse_body;
use crate::state::AppState;

const TOOL_DEMO_FAILURE: &str = "Failed to process tool demo request";

#[derive(Debug, Deserialize)]
struct ChatTurn {
    role: String,
    #[serde(default)]
    content: Option<TurnContent>,
    #[serde(default, rename = "toolInvocations")]
    tool_invocations: Vec<ToolInvocation>,
}

/// Plain text, or the `[{type, text}]` part list some chat clients send.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

impl TurnContent {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool call made in an earlier assistant turn, possibly with its result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolInvocation {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    result: Option<Value>,
}

impl ToolInvocation {
    fn tool_call(&self) -> ContentBlock {
        let arguments = if self.args.is_null() {
            json!({})
        } else {
            self.args.clone()
        };
        ContentBlock::tool_call(ToolCall {
            id: self.tool_call_id.clone(),
            name: self.tool_name.clone(),
            arguments,
        })
    }

    fn result_message(&self, result: &Value) -> Message {
        let text = match result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let is_error = result.get("success").and_then(Value::as_bool) == Some(false);
        Message::tool_result(&self.tool_call_id, &self.tool_name, text, is_error)
    }
}

/// Replays an assistant turn: answered tool calls, their results, then any text.
///
/// Invocations without a result never completed and are dropped, keeping
/// every tool call paired with a result.
fn assistant_messages(text: String, invocations: &[ToolInvocation]) -> Vec<Message> {
    let answered: Vec<(&ToolInvocation, &Value)> = invocations
        .iter()
        .filter_map(|invocation| invocation.result.as_ref().map(|result| (invocation, result)))
        .collect();
    let mut messages = Vec::new();
    if !answered.is_empty() {
        messages.push(Message::assistant_blocks(
            answered
                .iter()
                .map(|(invocation, _)| invocation.tool_call())
                .collect(),
        ));
        messages.extend(
            answered
                .iter()
                .map(|(invocation, result)| invocation.result_message(result)),
        );
    }
    if !text.trim().is_empty() {
        messages.push(Message::assistant_text(text));
    }
    messages
}

#[derive(Debug, Deserialize)]
struct ToolDemoRequest {
    messages: Vec<ChatTurn>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ToolDemoQuery {
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) enum SseFrame {
    Json { event: &'static str, payload: Value },
    Done,
}

impl SseFrame {
    fn into_event(self) -> Event {
        match self {
            Self::Json { event, payload } => Event::default()
                .event(event)
                .data(payload.to_string()),
            Self::Done => Event::default().event("done").data("[DONE]"),
        }
    }
}

/// Converts client turns into the transcript; system and data turns are dropped.
fn conversation_from_turns(turns: Vec<ChatTurn>) -> Result<Vec<Message>, ApiError> {
    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        let text = turn.content.map(TurnContent::into_text).unwrap_or_default();
        match turn.role.as_str() {
            "user" => messages.push(Message::user(text)),
            "assistant" => messages.extend(assistant_messages(text, &turn.tool_invocations)),
            "system" | "data" => {}
            other => {
                return Err(ApiError::bad_request(format!(
                    "unsupported message role '{other}'"
                )))
            }
        }
    }
    let ends_with_user = messages
        .last()
        .map(|message| message.role == MessageRole::User)
        .unwrap_or(false);
    if !ends_with_user {
        return Err(ApiError::bad_request(
            "messages must end with a user message",
        ));
    }
    Ok(messages)
}

pub(crate) fn event_frame(event: &AgentEvent) -> SseFrame {
    let (event, payload) = match event {
        AgentEvent::AgentStart => ("agent_start", json!({})),
        AgentEvent::AgentEnd {
            new_messages,
            outcome,
        } => (
            "agent_end",
            json!({ "newMessages": new_messages, "outcome": outcome }),
        ),
        AgentEvent::TurnStart { turn } => ("turn_start", json!({ "turn": turn })),
        AgentEvent::TurnEnd {
            turn,
            tool_results,
            request_duration_ms,
            usage,
            finish_reason,
        } => (
            "turn_end",
            json!({
                "turn": turn,
                "toolResults": tool_results,
                "requestDurationMs": request_duration_ms,
                "usage": usage,
                "finishReason": finish_reason,
            }),
        ),
        AgentEvent::MessageAdded { message } => ("message", json!({ "message": message })),
        AgentEvent::ToolExecutionStart {
            tool_call_id,
            tool_name,
            arguments,
        } => (
            "tool_start",
            json!({
                "toolCallId": tool_call_id,
                "toolName": tool_name,
                "arguments": arguments,
            }),
        ),
        AgentEvent::ToolExecutionEnd {
            tool_call_id,
            tool_name,
            result,
        } => (
            "tool_end",
            json!({
                "toolCallId": tool_call_id,
                "toolName": tool_name,
                "isError": result.is_error,
                "result": result.content,
            }),
        ),
        AgentEvent::StepBudgetExhausted { max_steps } => (
            "step_budget_exhausted",
            json!({ "maxSteps": max_steps }),
        ),
    };
    SseFrame::Json { event, payload }
}

fn run_summary(run: &AgentRun) -> Value {
    json!({
        "outcome": run.outcome,
        "messages": run.new_messages,
        "steps": run.steps,
        "usage": run.usage,
        "text": run.final_text(),
    })
}

/// System prompt built from the current label set; a failed fetch yields an empty list.
async fn load_system_prompt(state: &AppState) -> String {
    let labels = match state.gateway.list_labels().await {
        Ok(labels) => labels.into_iter().map(|label| label.name).collect(),
        Err(error) => {
            tracing::warn!(%error, "label fetch for system prompt failed");
            Vec::new()
        }
    };
    triage_system_prompt(&labels)
}

async fn build_agent(state: &AppState) -> Agent {
    let system_prompt = load_system_prompt(state).await;
    let mut agent = Agent::new(
        state.llm.clone(),
        AgentConfig {
            model: state.agent.model.clone(),
            system_prompt,
            max_steps: state.agent.max_steps,
            max_tokens: Some(state.agent.max_tokens),
            temperature: None,
            tool_timeout_ms: state.agent.tool_timeout_ms,
        },
    );
    register_triage_tools(&mut agent, &state.tool_context());
    agent
}

async fn run_conversation(
    state: &AppState,
    messages: Vec<Message>,
    frames: Option<mpsc::UnboundedSender<SseFrame>>,
) -> Result<AgentRun, AgentError> {
    let mut agent = build_agent(state).await;
    agent.extend_history(messages);
    let Some(frames) = frames else {
        return agent.continue_conversation().await;
    };

    let event_frames = frames.clone();
    agent.subscribe(move |event| {
        let _ = event_frames.send(event_frame(event));
    });
    let on_delta: StreamDeltaHandler = Arc::new(move |delta: String| {
        let _ = frames.send(SseFrame::Json {
            event: "text_delta",
            payload: json!({ "delta": delta }),
        });
    });
    agent.continue_conversation_with_stream(on_delta).await
}

pub(crate) async fn handle_tool_demo(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ToolDemoQuery>,
    body: Bytes,
) -> Response {
    let request = match parse_body::<ToolDemoRequest>(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let messages = match conversation_from_turns(request.messages) {
        Ok(messages) => messages,
        Err(error) => return error.into_response(),
    };

    if query.stream == Some(false) {
        return match run_conversation(&state, messages, None).await {
            Ok(run) => Json(run_summary(&run)).into_response(),
            Err(error) => {
                tracing::error!(%error, "tool demo conversation failed");
                ApiError::internal(TOOL_DEMO_FAILURE).into_response()
            }
        };
    }

    let (tx, rx) = mpsc::unbounded_channel::<SseFrame>();
    tokio::spawn(async move {
        let result = run_conversation(&state, messages, Some(tx.clone())).await;
        let frame = match result {
            Ok(run) => SseFrame::Json {
                event: "final",
                payload: run_summary(&run),
            },
            Err(error) => {
                tracing::error!(%error, "tool demo conversation failed");
                SseFrame::Json {
                    event: "error",
                    payload: json!({ "error": TOOL_DEMO_FAILURE }),
                }
            }
        };
        let _ = tx.send(frame);
        let _ = tx.send(SseFrame::Done);
    });

    let stream =
        UnboundedReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(frame.into_event()));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
