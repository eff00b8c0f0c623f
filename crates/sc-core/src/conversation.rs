//! Conversation history sent with every request.

use sc_protocol::{ChatMessage, CompletionRequest, Role};

#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: Option<String>,
    history: Vec<ChatMessage>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(system_prompt: Option<String>, max_messages: usize) -> Self {
        Self {
            system_prompt,
            history: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Add the pending user turn. History is only trimmed once the reply is
    /// committed, so a rollback restores the previous state exactly.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    /// Record a finished assistant reply.
    pub fn commit_reply(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
        self.evict();
    }

    /// Drop the trailing user turn after its reply failed or was cancelled.
    pub fn rollback_user(&mut self) {
        if self.history.last().map(|m| m.role) == Some(Role::User) {
            self.history.pop();
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Request carrying the system prompt and the full history.
    pub fn request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        CompletionRequest::new(messages)
    }

    fn evict(&mut self) {
        if self.history.len() > self.max_messages {
            let excess = self.history.len() - self.max_messages;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_starts_with_system_prompt() {
        let mut conv = Conversation::new(Some("be brief".to_string()), 10);
        conv.push_user("hi");

        let request = conv.request();
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], ChatMessage::system("be brief"));
        assert_eq!(request.messages[1], ChatMessage::user("hi"));
    }

    #[test]
    fn commit_and_rollback() {
        let mut conv = Conversation::new(None, 10);
        conv.push_user("first");
        conv.commit_reply("answer");
        conv.push_user("second");
        conv.rollback_user();

        assert_eq!(
            conv.messages(),
            &[ChatMessage::user("first"), ChatMessage::assistant("answer")]
        );

        // Only a trailing user turn is removed.
        conv.rollback_user();
        assert_eq!(conv.messages().len(), 2);
    }

    #[test]
    fn rollback_at_capacity_keeps_history() {
        let mut conv = Conversation::new(None, 2);
        conv.push_user("u1");
        conv.commit_reply("a1");
        conv.push_user("u2");
        assert_eq!(conv.request().messages.len(), 3);
        conv.rollback_user();

        assert_eq!(
            conv.messages(),
            &[ChatMessage::user("u1"), ChatMessage::assistant("a1")]
        );
    }

    #[test]
    fn oldest_messages_evicted() {
        let mut conv = Conversation::new(None, 3);
        conv.push_user("1");
        conv.commit_reply("2");
        conv.push_user("3");
        conv.commit_reply("4");

        let contents: Vec<_> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
    }

    #[test]
    fn reset_keeps_system_prompt() {
        let mut conv = Conversation::new(Some("sys".to_string()), 10);
        conv.push_user("hi");
        conv.reset();

        assert!(conv.is_empty());
        assert_eq!(conv.request().messages, vec![ChatMessage::system("sys")]);
    }
}
