//! Renderer request types shared by every backend

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A text-formatting request: instructions, prior turns and the data to phrase
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Flatten the conversation into a single prompt for completion-style APIs
    pub fn to_prompt(&self) -> String {
        let mut prompt = String::new();
        for turn in &self.messages {
            prompt.push_str(match turn.role {
                Role::User => "User: ",
                Role::Assistant => "Assistant: ",
                Role::System => "",
            });
            prompt.push_str(&turn.content);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Assistant:");
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_flattening() {
        let request = CompletionRequest {
            system: "Be brief".into(),
            messages: vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello"), ChatTurn::user("Cash?")],
            max_tokens: 100,
            temperature: 0.2,
        };
        let prompt = request.to_prompt();
        assert!(prompt.starts_with("User: Hi\n\nAssistant: Hello\n\nUser: Cash?"));
        assert!(prompt.ends_with("Assistant:"));
    }
}
