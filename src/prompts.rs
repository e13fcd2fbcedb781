//! Prompt text: flush headers, dispatch directives, and per-agent system
//! prompts.

use crate::agents::AgentKind;

/// Header introducing the screenshot section of a flush prompt.
pub const SCREENSHOTS_HEADER: &str =
    "The following are the screenshots from the user's computer:";

/// Header introducing the text section of a flush prompt.
pub const TEXT_HEADER: &str = "The following are text messages from the user:";

/// Header introducing the concurrent-conversation section.
pub const CONVERSATION_HEADER: &str =
    "The following are the conversations between the user and the chat agent \
     while capturing this content:";

/// Marker before the recent-screenshot block in a chat prompt.
pub const RECENT_IMAGES_START: &str =
    "Additional images (screenshots) from the system start here:";

/// Marker after the recent-screenshot block in a chat prompt.
pub const RECENT_IMAGES_END: &str =
    "Additional images (screenshots) from the system end here.";

/// Timestamp marker preceding one observation's images.
#[must_use]
pub fn image_marker(timestamp: &str, index: usize) -> String {
    format!("Timestamp: {timestamp} Image Index {index}:")
}

/// Timestamp marker preceding one observation's text.
#[must_use]
pub fn text_marker(timestamp: &str, text: &str) -> String {
    format!("Timestamp: {timestamp} Text:\n{text}")
}

/// Voice section of a flush prompt.
#[must_use]
pub fn voice_block(transcript: &str) -> String {
    format!("The following are the voice recordings and their transcriptions:\n{transcript}")
}

/// Trailing directive for direct fan-out dispatch.
#[must_use]
pub fn direct_directive(conversation_included: bool) -> &'static str {
    if conversation_included {
        "[System Message] Interpret the provided content and the conversations between the \
         user and the chat agent. According to what the user is doing, extract the important \
         information matching your memory type and save it into the memory."
    } else {
        "[System Message] Interpret the provided content. According to what the user is \
         doing, extract the important information matching your memory type and save it into \
         the memory."
    }
}

/// Trailing directive for routed (meta-memory) dispatch.
#[must_use]
pub fn meta_directive(conversation_included: bool) -> &'static str {
    if conversation_included {
        "[System Message] As the meta memory manager, analyze the provided content and the \
         conversations between the user and the chat agent. Based on what the user is doing, \
         determine which memories need to be updated (episodic, procedural, knowledge vault, \
         semantic, core, and resource) and call trigger_memory_update."
    } else {
        "[System Message] As the meta memory manager, analyze the provided content. Based on \
         the content, determine which memories need to be updated (episodic, procedural, \
         knowledge vault, semantic, core, and resource) and call trigger_memory_update."
    }
}

/// Instruction prefix appended by the routed dispatcher.
pub const META_INSTRUCTION_PREFIX: &str = "[Instruction from Meta Memory Manager]: ";

/// System prompt for one agent kind.
#[must_use]
pub fn system_prompt_for(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Chat => {
            "You are a personal assistant with a long-term memory of the user's activity. \
             Use search_in_memory to ground your answers in what the user has actually done, \
             and always finish the turn by calling respond_to_user with the complete reply."
        }
        AgentKind::MetaMemory => {
            "You are the meta memory manager. You never store memories yourself: you read the \
             observed content, decide which memory types it concerns, and call \
             trigger_memory_update with one instruction per chosen type."
        }
        AgentKind::EpisodicMemory => {
            "You manage episodic memory: time-stamped events describing what the user or the \
             assistant did. Extract new events from the observed content, merge continuations \
             into existing events with episodic_memory_append, and collapse repeats with \
             episodic_memory_replace."
        }
        AgentKind::ProceduralMemory => {
            "You manage procedural memory: how-to knowledge as ordered step sequences. \
             Extract workflows and guides the user follows; keep steps concrete and ordered."
        }
        AgentKind::KnowledgeVault => {
            "You manage the knowledge vault: credential-like values (tokens, addresses, \
             account numbers) stored verbatim. Every entry must carry a sensitivity level."
        }
        AgentKind::SemanticMemory => {
            "You manage semantic memory: concepts and their definitions, independent of when \
             they were learned. Extract durable knowledge about entities the user works with."
        }
        AgentKind::CoreMemory => {
            "You manage core memory: the always-in-context persona and human blocks. Append \
             or replace only durable, identity-level facts."
        }
        AgentKind::ResourceMemory => {
            "You manage resource memory: documents and artifacts the user is actively working \
             with. Capture titles, summaries, and the content worth keeping."
        }
        AgentKind::Reflexion => {
            "You are the reflexion agent. You audit the memory stores across all six types: \
             merge duplicates, resolve contradictions in favor of newer evidence, and \
             synthesize recurring themes into semantic or core memories."
        }
    }
}

/// Redundancy-phase prompt for one memory agent.
#[must_use]
pub fn redundancy_prompt(kind: AgentKind) -> String {
    format!(
        "[System Message] Review your {} store for duplicates. Use search_in_memory and your \
         update tools to merge or delete entries that describe the same thing; keep the most \
         complete version.",
        kind.as_str().replace('_', " ")
    )
}

/// Conflict-phase prompt for the reflexion agent.
pub const CONFLICT_PROMPT: &str =
    "[System Message] Look for contradictions across the memory stores: events that cannot \
     both be true, definitions that disagree, procedures superseded by newer ones. Resolve \
     each by updating the newer entry and deleting the stale one; when unsure, keep both and \
     note the conflict in the newer entry's details.";

/// Pattern-phase prompt for the synthesis agents.
pub const PATTERN_PROMPT: &str =
    "[System Message] Identify recurring themes across recent memories (repeated activities, \
     stable preferences, ongoing projects) and save them: durable concepts into semantic \
     memory, identity-level facts into core memory.";
