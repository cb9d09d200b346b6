use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::{
    retry::{is_transient_status, is_transient_transport_error, retry_after_ms, RetryPolicy},
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolDefinition, TriageAiError,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    /// Total wall-clock budget for retry sleeps; `0` disables the budget.
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    config: AnthropicConfig,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, TriageAiError> {
        if config.api_key.trim().is_empty() {
            return Err(TriageAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.trim()).map_err(|error| {
                TriageAiError::InvalidResponse(format!("invalid API key header: {error}"))
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            return base.to_string();
        }
        format!("{base}/messages")
    }

    async fn send_messages(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, TriageAiError> {
        let mut body = build_messages_request_body(&request);
        if on_delta.is_some() {
            body["stream"] = json!(true);
        }
        let url = self.messages_url();
        let started = Instant::now();

        for attempt in 0..=self.retry.max_retries() {
            let response = self
                .client
                .post(&url)
                .header("x-triage-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    if is_transient_transport_error(&error) {
                        if let Some(delay) = self.retry.delay_for(attempt, started.elapsed(), None)
                        {
                            let delay_ms = delay.as_millis() as u64;
                            tracing::debug!(attempt, delay_ms, %error, "retrying anthropic request");
                            sleep(delay).await;
                            continue;
                        }
                    }
                    return Err(TriageAiError::Http(error));
                }
            };

            let status = response.status();
            if status.is_success() {
                return match on_delta {
                    Some(handler) if is_event_stream(response.headers()) => {
                        parse_messages_stream_response(response, handler).await
                    }
                    Some(handler) => {
                        let parsed = parse_messages_response(&response.text().await?)?;
                        let text = parsed.message.text_content();
                        if !text.is_empty() {
                            handler(text);
                        }
                        Ok(parsed)
                    }
                    None => parse_messages_response(&response.text().await?),
                };
            }

            let hint_ms = retry_after_ms(response.headers());
            let raw = response.text().await?;
            if is_transient_status(status.as_u16()) {
                if let Some(delay) = self.retry.delay_for(attempt, started.elapsed(), hint_ms) {
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        status = status.as_u16(),
                        "retrying anthropic request"
                    );
                    sleep(delay).await;
                    continue;
                }
            }

            return Err(TriageAiError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        Err(TriageAiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        self.send_messages(request, None).await
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, TriageAiError> {
        self.send_messages(request, on_delta).await
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/event-stream"))
}

fn build_messages_request_body(request: &ChatRequest) -> Value {
    let system = request
        .messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(Message::text_content)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut body = json!({
        "model": request.model,
        "messages": to_anthropic_messages(&request.messages),
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if !request.tools.is_empty() {
        body["tools"] = to_anthropic_tools(&request.tools);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn to_anthropic_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                })
            })
            .collect(),
    )
}

fn to_anthropic_messages(messages: &[Message]) -> Value {
    let mut converted: Vec<Value> = Vec::new();
    for message in messages {
        let (role, parts) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", content_parts(message, false)),
            MessageRole::Assistant => ("assistant", content_parts(message, true)),
            MessageRole::Tool => {
                let part = match message.tool_call_id.as_deref() {
                    Some(tool_call_id) => json!({
                        "type": "tool_result",
                        "tool_use_id": tool_call_id,
                        "content": message.text_content(),
                        "is_error": message.is_error,
                    }),
                    None => json!({
                        "type": "text",
                        "text": "invalid tool result message: missing tool_call_id",
                    }),
                };
                ("user", vec![part])
            }
        };
        if parts.is_empty() {
            continue;
        }

        // Consecutive tool results from one turn must share a single user message.
        if role == "user" && message.role == MessageRole::Tool {
            if let Some(last) = converted.last_mut() {
                let last_is_tool_batch = last["role"] == "user"
                    && last["content"]
                        .as_array()
                        .is_some_and(|blocks| blocks.iter().all(|b| b["type"] == "tool_result"));
                if last_is_tool_batch {
                    if let Some(blocks) = last["content"].as_array_mut() {
                        blocks.extend(parts);
                        continue;
                    }
                }
            }
        }

        converted.push(json!({ "role": role, "content": parts }));
    }
    Value::Array(converted)
}

fn content_parts(message: &Message, allow_tool_calls: bool) -> Vec<Value> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(json!({
                "type": "text",
                "text": text,
            })),
            ContentBlock::Text { .. } => None,
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } if allow_tool_calls => Some(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": arguments,
            })),
            ContentBlock::ToolCall { .. } => None,
        })
        .collect()
}

fn parse_messages_response(raw: &str) -> Result<ChatResponse, TriageAiError> {
    let parsed: AnthropicMessageResponse = serde_json::from_str(raw)?;

    let blocks = parsed
        .content
        .into_iter()
        .filter_map(|part| match part {
            AnthropicContent::Text { text } if !text.trim().is_empty() => {
                Some(ContentBlock::Text { text })
            }
            AnthropicContent::ToolUse { id, name, input } => Some(ContentBlock::ToolCall {
                id,
                name,
                arguments: input,
            }),
            AnthropicContent::Text { .. } | AnthropicContent::Other => None,
        })
        .collect();

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant_blocks(blocks),
        finish_reason: parsed.stop_reason,
        usage,
    })
}

async fn parse_messages_stream_response(
    response: reqwest::Response,
    on_delta: StreamDeltaHandler,
) -> Result<ChatResponse, TriageAiError> {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();
    let mut state = StreamAccumulator::new(on_delta);

    while let Some(chunk) = stream.next().await {
        for event in decoder.push(chunk?.as_ref())? {
            state.apply_event(event.name.as_deref(), &event.data)?;
        }
    }
    if let Some(event) = decoder.finish()? {
        state.apply_event(event.name.as_deref(), &event.data)?;
    }

    Ok(state.finish())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    name: Option<String>,
    data: String,
}

/// Splits a byte stream into SSE events.
///
/// Bytes are buffered until a full line is available, so a UTF-8 sequence
/// split across network chunks is decoded only once it is complete.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
    name: Option<String>,
    data: String,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, TriageAiError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = decode_line(&raw[..pos])?;
            if let Some(event) = self.accept_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn finish(mut self) -> Result<Option<SseEvent>, TriageAiError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = decode_line(&rest)?;
            if let Some(event) = self.accept_line(line.trim_end_matches('\r')) {
                return Ok(Some(event));
            }
        }
        Ok(self.take_event())
    }

    fn accept_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.name = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data.trim());
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        let name = self.name.take();
        if self.data.trim().is_empty() {
            self.data.clear();
            return None;
        }
        Some(SseEvent {
            name,
            data: std::mem::take(&mut self.data),
        })
    }
}

fn decode_line(bytes: &[u8]) -> Result<String, TriageAiError> {
    String::from_utf8(bytes.to_vec()).map_err(|error| {
        TriageAiError::InvalidResponse(format!(
            "invalid UTF-8 in Anthropic streaming response: {error}"
        ))
    })
}

#[derive(Debug, Default)]
struct ToolUseAccumulator {
    id: String,
    name: String,
    input: Option<Value>,
    partial_json: String,
}

/// Folds Anthropic SSE events into a single `ChatResponse`.
struct StreamAccumulator {
    on_delta: StreamDeltaHandler,
    text: String,
    tool_calls: Vec<ToolUseAccumulator>,
    finish_reason: Option<String>,
    usage: ChatUsage,
}

impl StreamAccumulator {
    fn new(on_delta: StreamDeltaHandler) -> Self {
        Self {
            on_delta,
            text: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: ChatUsage::default(),
        }
    }

    fn slot(&mut self, index: usize) -> &mut ToolUseAccumulator {
        if self.tool_calls.len() <= index {
            self.tool_calls
                .resize_with(index + 1, ToolUseAccumulator::default);
        }
        &mut self.tool_calls[index]
    }

    fn apply_event(&mut self, event: Option<&str>, data: &str) -> Result<(), TriageAiError> {
        if data.is_empty() {
            return Ok(());
        }

        let payload: Value = serde_json::from_str(data).map_err(|error| {
            TriageAiError::InvalidResponse(format!("failed to parse Anthropic stream chunk: {error}"))
        })?;
        let payload_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if payload_type == "error" || event == Some("error") {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("anthropic stream returned error event");
            return Err(TriageAiError::InvalidResponse(message.to_string()));
        }

        match payload_type {
            "message_start" => {
                if let Some(input_tokens) = payload
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = input_tokens;
                }
            }
            "content_block_start" => {
                let Some(index) = payload.get("index").and_then(Value::as_u64) else {
                    return Ok(());
                };
                let block = payload.get("content_block").cloned().unwrap_or_default();
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let slot = self.slot(index as usize);
                    if let Some(id) = block.get("id").and_then(Value::as_str) {
                        slot.id = id.to_string();
                    }
                    if let Some(name) = block.get("name").and_then(Value::as_str) {
                        slot.name = name.to_string();
                    }
                    // The start block carries `{}` when the input streams as partial JSON.
                    if let Some(input) = block.get("input").filter(|input| {
                        input.as_object().map_or(true, |object| !object.is_empty())
                    }) {
                        slot.input = Some(input.clone());
                    }
                }
            }
            "content_block_delta" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let delta = payload.get("delta").cloned().unwrap_or_default();
                match delta.get("type").and_then(Value::as_str).unwrap_or_default() {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                self.text.push_str(text);
                                (self.on_delta)(text.to_string());
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                            self.slot(index).partial_json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                if let Some(reason) = payload.pointer("/delta/stop_reason").and_then(Value::as_str)
                {
                    self.finish_reason = Some(reason.to_string());
                }
                if let Some(output_tokens) = payload
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.output_tokens = output_tokens;
                }
            }
            _ => {}
        }

        self.usage.total_tokens = self.usage.input_tokens + self.usage.output_tokens;
        Ok(())
    }

    fn finish(self) -> ChatResponse {
        let mut blocks = Vec::new();
        if !self.text.trim().is_empty() {
            blocks.push(ContentBlock::Text { text: self.text });
        }

        for (index, tool_call) in self.tool_calls.into_iter().enumerate() {
            if tool_call.name.trim().is_empty() {
                continue;
            }
            let id = if tool_call.id.trim().is_empty() {
                format!("anthropic_tool_{}", index + 1)
            } else {
                tool_call.id
            };
            let arguments = match tool_call.input {
                Some(input) => input,
                None if !tool_call.partial_json.trim().is_empty() => {
                    serde_json::from_str::<Value>(&tool_call.partial_json)
                        .unwrap_or(Value::String(tool_call.partial_json))
                }
                None => json!({}),
            };
            blocks.push(ContentBlock::ToolCall {
                id,
                name: tool_call.name,
                arguments,
            });
        }

        ChatResponse {
            message: Message::assistant_blocks(blocks),
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
