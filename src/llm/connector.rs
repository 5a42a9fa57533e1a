//! The LLM connector: complete / stream / tool-call / embed.
//!
//! [`LlmClient`] is the object-safe seam every pipeline stage, subagent,
//! and ETL extraction goes through. [`OpenAiCompatibleConnector`] is the
//! production implementation: bearer auth from the execution context,
//! bounded retries with circuit breaking, and per-call cost accounting
//! into the context ledger.
//!
//! # Contracts
//!
//! - Every call appends an [`LlmCostRecord`](crate::context::LlmCostRecord)
//!   to the context; absent `usage` fields default to zero and never fail
//!   the call.
//! - Transport errors and 408/429/5xx responses retry a bounded number of
//!   times; other 4xx-class responses fail fast.
//! - Tool-call `arguments` are returned as raw strings; callers parse them
//!   (and must tolerate surrounding whitespace).
//! - `stream` yields a finite, non-restartable sequence of content deltas.

use super::retry::{RetryExecutor, RetryPolicy};
use super::types::{ChatCompletion, ChatMessage, LlmParams, ToolDefinition, Usage};
use super::wire::{
    WireChatRequest, WireChatResponse, WireEmbeddingRequest, WireEmbeddingResponse,
    WireStreamChunk, WireTool,
};
use crate::context::{ExecutionContext, LlmCostRecord};
use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_warn};
use crate::settings::LlmSettings;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// Stream of completion deltas.
pub type DeltaStream = BoxStream<'static, AegisResult<String>>;

/// Uniform LLM operations used by every agent and ETL.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion>;

    /// Streamed completion: a finite, non-restartable sequence of content
    /// deltas.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<DeltaStream>;

    /// Completion with tools; `choices[0].message` carries either content
    /// or tool calls with raw-string arguments.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion>;

    /// Embed one text into a dense vector.
    async fn embed(&self, text: &str, ctx: &ExecutionContext) -> AegisResult<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(
        &self,
        texts: &[String],
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<Vec<f32>>>;
}

/// Production connector for OpenAI-compatible endpoints.
pub struct OpenAiCompatibleConnector {
    http: reqwest::Client,
    llm: LlmSettings,
    executor: RetryExecutor,
}

impl OpenAiCompatibleConnector {
    /// Build the connector from resolved settings and an SSL-aware client.
    pub fn new(http: reqwest::Client, llm: LlmSettings) -> Self {
        Self {
            http,
            llm,
            executor: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    /// Build with a custom retry policy.
    pub fn with_retry_policy(http: reqwest::Client, llm: LlmSettings, policy: RetryPolicy) -> Self {
        Self {
            http,
            llm,
            executor: RetryExecutor::new(policy),
        }
    }

    fn bearer(&self, ctx: &ExecutionContext) -> AegisResult<String> {
        if !ctx.auth.success {
            return Err(AegisError::auth(
                ctx.auth
                    .error
                    .clone()
                    .unwrap_or_else(|| "No credential available".to_string()),
            ));
        }
        ctx.auth
            .bearer_header()
            .ok_or_else(|| AegisError::auth("Credential is missing a token"))
    }

    fn record_usage(&self, ctx: &ExecutionContext, model: &str, usage: Option<Usage>) {
        let usage = usage.unwrap_or_default();
        let (rate_in, rate_out) = self.llm.rates_for_model(model).unwrap_or((0.0, 0.0));
        let cost = usage.prompt_tokens as f64 / 1000.0 * rate_in
            + usage.completion_tokens as f64 / 1000.0 * rate_out;
        ctx.record_llm_cost(LlmCostRecord {
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost,
        });
    }

    /// Classify an HTTP status for retry purposes.
    ///
    /// 408 and 429 are transient; everything else in the 4xx class is a
    /// caller problem and fails fast; 5xx retries.
    fn status_retryable(status: reqwest::StatusCode) -> bool {
        status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error()
    }

    async fn post_chat(
        &self,
        request: &WireChatRequest,
        bearer: &str,
    ) -> AegisResult<WireChatResponse> {
        let url = format!("{}/v1/chat/completions", self.llm.base_url);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AegisError::upstream(format!("LLM request failed: {e}"), true, Some(Box::new(e)))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AegisError::upstream(
                format!("LLM provider returned {status}: {body}"),
                Self::status_retryable(status),
                None,
            ));
        }

        response.json().await.map_err(|e| {
            AegisError::upstream(
                format!("Invalid LLM response body: {e}"),
                false,
                Some(Box::new(e)),
            )
        })
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion> {
        let bearer = self.bearer(ctx)?;
        let request = WireChatRequest {
            model: params.model.clone(),
            messages: messages.to_vec(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            tools: tools.map(|ts| ts.iter().map(WireTool::from).collect()),
            tool_choice: tools.map(|_| "required".to_string()),
            stream: None,
        };

        log_debug!(
            execution_id = %ctx.execution_id,
            model = %params.model,
            message_count = messages.len(),
            has_tools = tools.is_some(),
            "Executing LLM request"
        );

        let wire = self.executor.execute(|| self.post_chat(&request, &bearer)).await?;
        let completion = ChatCompletion::from(wire);
        self.record_usage(ctx, &params.model, completion.usage);
        Ok(completion)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleConnector {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion> {
        self.chat(messages, None, ctx, params).await
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<DeltaStream> {
        let bearer = self.bearer(ctx)?;
        let request = WireChatRequest {
            model: params.model.clone(),
            messages: messages.to_vec(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            tools: None,
            tool_choice: None,
            stream: Some(true),
        };

        let url = format!("{}/v1/chat/completions", self.llm.base_url);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, bearer.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AegisError::upstream(format!("LLM stream failed: {e}"), true, Some(Box::new(e)))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AegisError::upstream(
                format!("LLM provider returned {status}: {body}"),
                Self::status_retryable(status),
                None,
            ));
        }

        // Streamed responses rarely report usage; the call is recorded in
        // the ledger with zero token counts so stage totals still count it.
        self.record_usage(ctx, &params.model, None);

        let (tx, rx) = tokio::sync::mpsc::channel::<AegisResult<String>>(32);
        let mut bytes = response.bytes_stream();
        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AegisError::upstream(
                                format!("Stream transport error: {e}"),
                                false,
                                None,
                            )))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited `data: ` lines.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<WireStreamChunk>(payload) {
                        Ok(parsed) => {
                            if let Some(delta) =
                                parsed.choices.first().and_then(|c| c.delta.content.clone())
                            {
                                if tx.send(Ok(delta)).await.is_err() {
                                    // Consumer dropped the stream; stop promptly.
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            log_warn!(error = %e, "Skipping undecodable stream chunk");
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion> {
        self.chat(messages, Some(tools), ctx, params).await
    }

    async fn embed(&self, text: &str, ctx: &ExecutionContext) -> AegisResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()], ctx).await?;
        vectors
            .pop()
            .ok_or_else(|| AegisError::upstream("Embedding response was empty", false, None))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<Vec<f32>>> {
        let bearer = self.bearer(ctx)?;
        let request = WireEmbeddingRequest {
            model: self.llm.embedding_model.clone(),
            input: texts.to_vec(),
        };
        let url = format!("{}/v1/embeddings", self.llm.base_url);

        let response: WireEmbeddingResponse = self
            .executor
            .execute(|| async {
                let response = self
                    .http
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, bearer.as_str())
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| {
                        AegisError::upstream(
                            format!("Embedding request failed: {e}"),
                            true,
                            Some(Box::new(e)),
                        )
                    })?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AegisError::upstream(
                        format!("Embedding endpoint returned {status}: {body}"),
                        Self::status_retryable(status),
                        None,
                    ));
                }

                response.json().await.map_err(|e| {
                    AegisError::upstream(
                        format!("Invalid embedding response body: {e}"),
                        false,
                        Some(Box::new(e)),
                    )
                })
            })
            .await?;

        self.record_usage(ctx, &self.llm.embedding_model, response.usage);

        if response.data.len() != texts.len() {
            return Err(AegisError::upstream(
                format!(
                    "Embedding count mismatch: asked for {}, got {}",
                    texts.len(),
                    response.data.len()
                ),
                false,
                None,
            ));
        }

        Ok(response.data.into_iter().map(|row| row.embedding).collect())
    }
}
