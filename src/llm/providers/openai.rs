//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override. Multimodal prompt parts translate to
//! content-part arrays at this boundary: blob URIs and inline images
//! both become image-url parts.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequest, FunctionCall, FunctionObject, ImageDetail, ImageUrl,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::error::AgentError;
use crate::llm::message::{ChatMessage, ChatRequest, ChatResponse, PromptPart, Role, TokenUsage};
use crate::llm::provider::LlmProvider;
use crate::llm::tool::ToolCall;

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider with the given API key and optional base URL.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    fn user_content_part(part: &PromptPart) -> ChatCompletionRequestUserMessageContentPart {
        match part {
            PromptPart::Text { text } => ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText { text: text.clone() },
            ),
            PromptPart::BlobUri { uri } => ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: uri.clone(),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
            PromptPart::InlineImage { data, mime } => {
                let url = format!("data:{mime};base64,{}", B64.encode(data));
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url,
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                )
            }
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.text_content()),
                    name: None,
                })
            }
            Role::User => {
                // Text-only messages stay plain strings; anything with an
                // image goes through the content-part array form.
                let has_media = msg
                    .parts
                    .iter()
                    .any(|p| !matches!(p, PromptPart::Text { .. }));
                let content = if has_media {
                    ChatCompletionRequestUserMessageContent::Array(
                        msg.parts.iter().map(Self::user_content_part).collect(),
                    )
                } else {
                    ChatCompletionRequestUserMessageContent::Text(msg.text_content())
                };
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content,
                    name: None,
                })
            }
            Role::Assistant => {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                let text = msg.text_content();
                let content = if text.is_empty() {
                    None
                } else {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(text))
                };

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.text_content()),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|td| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: td.name.clone(),
                            description: Some(td.description.clone()),
                            parameters: Some(td.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            tools,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::llm::message::{system_message, user_message, user_parts};
    use crate::llm::tool::ToolDefinition;

    #[test]
    fn test_convert_system_message() {
        let converted = OpenAiProvider::convert_message(&system_message("test"));
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
    }

    #[test]
    fn test_convert_text_only_user_stays_plain() {
        let converted = OpenAiProvider::convert_message(&user_message("hello"));
        if let ChatCompletionRequestMessage::User(user) = converted {
            assert!(matches!(
                user.content,
                ChatCompletionRequestUserMessageContent::Text(_)
            ));
        } else {
            panic!("Expected User message");
        }
    }

    #[test]
    fn test_convert_blob_uri_becomes_image_part() {
        let msg = user_parts(vec![
            PromptPart::text("Timestamp: t0 Image Index 0:"),
            PromptPart::blob_uri("https://blobs/abc"),
        ]);
        let converted = OpenAiProvider::convert_message(&msg);
        if let ChatCompletionRequestMessage::User(user) = converted {
            if let ChatCompletionRequestUserMessageContent::Array(parts) = user.content {
                assert_eq!(parts.len(), 2);
                assert!(matches!(
                    parts[1],
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(_)
                ));
            } else {
                panic!("Expected Array content");
            }
        } else {
            panic!("Expected User message");
        }
    }

    #[test]
    fn test_convert_inline_image_is_data_url() {
        let msg = user_parts(vec![PromptPart::InlineImage {
            data: vec![1, 2, 3],
            mime: "image/png".to_string(),
        }]);
        let converted = OpenAiProvider::convert_message(&msg);
        if let ChatCompletionRequestMessage::User(user) = converted
            && let ChatCompletionRequestUserMessageContent::Array(parts) = user.content
            && let ChatCompletionRequestUserMessageContentPart::ImageUrl(img) = &parts[0]
        {
            assert!(img.image_url.url.starts_with("data:image/png;base64,"));
        } else {
            panic!("Expected image-url part");
        }
    }

    #[test]
    fn test_build_request_with_tools() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![user_message("test")],
            temperature: Some(0.0),
            max_tokens: Some(100),
            tools: vec![ToolDefinition {
                name: "episodic_memory_insert".to_string(),
                description: "Insert events".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
        };
        let built = OpenAiProvider::build_request(&request);
        assert_eq!(built.tools.as_ref().map_or(0, Vec::len), 1);
        // Temperature 0.0 is the provider default; omitted from the wire.
        assert!(built.temperature.is_none());
    }
}
