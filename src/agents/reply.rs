//! Extraction of the user-facing reply from a chat agent transcript.
//!
//! The chat agent delivers its reply by calling the terminal tool with a
//! `message` argument. Parsing failures collapse into sentinel tokens so
//! the chat front-end can always show a recoverable string instead of an
//! exception.

use crate::llm::message::{ChatMessage, ChatResponse};
use crate::llm::tool::ToolCall;

/// Why a reply could not be extracted.
///
/// `token()` yields the sentinel string surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyError {
    /// The provider call itself failed.
    ResponseFailed,
    /// The transcript was too short to contain a reply.
    InvalidResponseStructure,
    /// No tool call was found in the final messages.
    NoToolCall,
    /// A tool call was found but its arguments carry no `message`.
    NoMessageInArgs,
    /// The tool call arguments were not valid JSON.
    ParsingException,
}

impl ReplyError {
    /// The sentinel token surfaced to the chat front-end.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::ResponseFailed => "ERROR_RESPONSE_FAILED",
            Self::InvalidResponseStructure => "ERROR_INVALID_RESPONSE_STRUCTURE",
            Self::NoToolCall => "ERROR_NO_TOOL_CALL",
            Self::NoMessageInArgs => "ERROR_NO_MESSAGE_IN_ARGS",
            Self::ParsingException => "ERROR_PARSING_EXCEPTION",
        }
    }
}

/// Extracts the user-facing reply from the final response and transcript.
///
/// Looks at the final response's tool calls first, then walks the
/// transcript backwards over earlier assistant tool calls. The first
/// call whose arguments parse as JSON containing a `message` field wins.
pub fn extract_reply(
    response: &ChatResponse,
    transcript: &[ChatMessage],
) -> Result<String, ReplyError> {
    if transcript.len() < 2 {
        return Err(ReplyError::InvalidResponseStructure);
    }

    let mut saw_tool_call = false;
    let mut parse_failed = false;

    let transcript_calls = transcript
        .iter()
        .rev()
        .flat_map(|msg| msg.tool_calls.iter());

    for call in response.tool_calls.iter().chain(transcript_calls) {
        saw_tool_call = true;
        match message_from_call(call) {
            Ok(Some(message)) => return Ok(message),
            Ok(None) => {}
            Err(()) => parse_failed = true,
        }
    }

    if !saw_tool_call {
        return Err(ReplyError::NoToolCall);
    }
    if parse_failed {
        return Err(ReplyError::ParsingException);
    }
    Err(ReplyError::NoMessageInArgs)
}

/// Parses one call's arguments: `Ok(Some)` with a message, `Ok(None)` if
/// the JSON has no `message` field, `Err` on malformed JSON.
fn message_from_call(call: &ToolCall) -> Result<Option<String>, ()> {
    let parsed: serde_json::Value = serde_json::from_str(&call.arguments).map_err(|_| ())?;
    Ok(parsed
        .get("message")
        .and_then(|m| m.as_str())
        .map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::{
        TokenUsage, assistant_tool_calls_message, system_message, user_message,
    };

    fn response_with_calls(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            usage: TokenUsage::default(),
            tool_calls: calls,
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    fn transcript() -> Vec<ChatMessage> {
        vec![system_message("sys"), user_message("hi")]
    }

    #[test]
    fn test_extracts_message_from_final_call() {
        let response =
            response_with_calls(vec![call("respond_to_user", r#"{"message": "hello there"}"#)]);
        assert_eq!(
            extract_reply(&response, &transcript()).as_deref(),
            Ok("hello there")
        );
    }

    #[test]
    fn test_short_transcript_is_invalid_structure() {
        let response = response_with_calls(vec![]);
        assert_eq!(
            extract_reply(&response, &[system_message("sys")]),
            Err(ReplyError::InvalidResponseStructure)
        );
    }

    #[test]
    fn test_no_tool_call() {
        let response = response_with_calls(vec![]);
        assert_eq!(
            extract_reply(&response, &transcript()),
            Err(ReplyError::NoToolCall)
        );
    }

    #[test]
    fn test_no_message_in_args() {
        let response = response_with_calls(vec![call("respond_to_user", r#"{"text": "x"}"#)]);
        assert_eq!(
            extract_reply(&response, &transcript()),
            Err(ReplyError::NoMessageInArgs)
        );
    }

    #[test]
    fn test_malformed_args_is_parsing_exception() {
        let response = response_with_calls(vec![call("respond_to_user", "not json")]);
        assert_eq!(
            extract_reply(&response, &transcript()),
            Err(ReplyError::ParsingException)
        );
    }

    #[test]
    fn test_falls_back_to_transcript_calls() {
        // Final response has no calls, but an earlier assistant message
        // carried the reply.
        let response = ChatResponse {
            content: "done".to_string(),
            usage: TokenUsage::default(),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        };
        let mut messages = transcript();
        messages.push(assistant_tool_calls_message(vec![call(
            "respond_to_user",
            r#"{"message": "from transcript"}"#,
        )]));
        assert_eq!(
            extract_reply(&response, &messages).as_deref(),
            Ok("from transcript")
        );
    }

    #[test]
    fn test_tokens() {
        assert_eq!(ReplyError::ResponseFailed.token(), "ERROR_RESPONSE_FAILED");
        assert_eq!(ReplyError::NoToolCall.token(), "ERROR_NO_TOOL_CALL");
    }
}
