#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::{Context, Result};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use tracing::debug;

use super::{ChatMessage, ChatModel, ChatRequest, ModelTurn, ToolInvocation};
use crate::{config::OpenAiEnv, tools::ToolDefinition};

/// A chat model served by an OpenAI-compatible endpoint.
pub struct OpenAiModel {
    /// HTTP client configured with the endpoint and key.
    client: OpenAIClient<OpenAIConfig>,
    /// Model name sent with every request.
    model:  String,
}

impl OpenAiModel {
    /// Creates a model using the endpoint and key in `env`.
    pub fn new(env: &OpenAiEnv, model: impl Into<String>) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(env.api_key().to_owned()),
        );
        Self {
            client,
            model: model.into(),
        }
    }
}

impl std::fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModel").field("model", &self.model).finish_non_exhaustive()
    }
}

/// Converts a conversation message to the request type.
fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    Ok(match message {
        ChatMessage::System(text) => ChatCompletionRequestSystemMessageArgs::default()
            .content(text.as_str())
            .build()?
            .into(),
        ChatMessage::User(text) => ChatCompletionRequestUserMessageArgs::default()
            .content(text.as_str())
            .build()?
            .into(),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if let Some(content) = content {
                args.content(content.as_str());
            }
            if !tool_calls.is_empty() {
                args.tool_calls(
                    tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id:       call.id.clone(),
                            r#type:   ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name:      call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            args.build()?.into()
        }
        ChatMessage::Tool { call_id, content } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(call_id.as_str())
            .content(content.as_str())
            .build()?
            .into(),
    })
}

/// Converts a tool declaration to the request type.
fn to_request_tool(tool: &ToolDefinition) -> Result<ChatCompletionTool> {
    Ok(ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name(tool.name)
                .description(tool.description)
                .parameters(tool.parameters.clone())
                .build()?,
        )
        .build()?)
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn> {
        let messages = request
            .messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;
        let tools = request
            .tools
            .iter()
            .map(to_request_tool)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.as_str())
            .messages(messages)
            .temperature(request.temperature)
            .n(1);
        if !tools.is_empty() {
            args.tools(tools);
        }

        let response = self
            .client
            .chat()
            .create(args.build()?)
            .await
            .context("Chat completion request failed")?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion"
            );
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .context("Chat completion returned no choices")?;

        match message.tool_calls {
            Some(calls) if !calls.is_empty() => Ok(ModelTurn::ToolCalls {
                content: message.content,
                calls:   calls
                    .into_iter()
                    .map(|call| ToolInvocation::new(call.id, call.function.name, call.function.arguments))
                    .collect(),
            }),
            _ => Ok(ModelTurn::Final(message.content.unwrap_or_default())),
        }
    }
}
