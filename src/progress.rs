//! Placeholder-then-final delivery on top of the engine.
//!
//! A caller that wants to show progress hands the engine a [`DisplaySink`]: it
//! receives an interim text as soon as the request is queued and exactly one
//! final text once the request resolves, fails or times out.

use crate::{
    delivery::Awaited,
    engine::InfernumEngine,
    envelope::{Outcome, TaskId},
    error::InfernumError,
    model::{InfernumModel, RequestMetadata},
    worker::EngineResponse,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Receives the interim and final texts of a request.
pub trait DisplaySink {
    /// Shows `text` for `id` while the request is in flight.
    fn interim(&mut self, id: TaskId, text: &str);

    /// Replaces whatever was shown for `id` with the final outcome.
    fn finalize(&mut self, id: TaskId, outcome: Outcome<String>);
}

impl<S: DisplaySink> DisplaySink for Arc<Mutex<S>> {
    fn interim(&mut self, id: TaskId, text: &str) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .interim(id, text);
    }

    fn finalize(&mut self, id: TaskId, outcome: Outcome<String>) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finalize(id, outcome);
    }
}

/// Submits `request`, shows `placeholder` right away and then waits for the
/// response, handing the sink exactly one final outcome.
///
/// `render` turns a successful response into the text to display. A timeout
/// is shown as a failure; the request itself keeps running on the worker.
/// A rejected request leaves the sink untouched.
pub fn submit_with_progress<M, S>(
    engine: &InfernumEngine<M>,
    request: M::Request,
    placeholder: &str,
    timeout: Option<Duration>,
    sink: &mut S,
    render: impl FnOnce(&M::Response) -> String,
) -> Result<Awaited<EngineResponse<M>>, InfernumError>
where
    M: InfernumModel + Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
    S: DisplaySink + ?Sized,
{
    let id = engine.submit(request)?;
    Ok(await_with_progress(engine, id, placeholder, timeout, sink, render))
}

/// Shows `placeholder` for an already submitted `id`, waits for its response
/// and hands the sink exactly one final outcome.
///
/// Lets callers record their own bookkeeping between a successful
/// [`InfernumEngine::submit`] and the wait.
pub fn await_with_progress<M, S>(
    engine: &InfernumEngine<M>,
    id: TaskId,
    placeholder: &str,
    timeout: Option<Duration>,
    sink: &mut S,
    render: impl FnOnce(&M::Response) -> String,
) -> Awaited<EngineResponse<M>>
where
    M: InfernumModel + Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
    S: DisplaySink + ?Sized,
{
    sink.interim(id, placeholder);

    let awaited = engine.await_result(id, timeout);
    let outcome = match &awaited {
        Awaited::Ready(response) => match &response.outcome {
            Outcome::Success(value) => Outcome::Success(render(value)),
            Outcome::Failure(reason) => Outcome::Failure(reason.clone()),
        },
        Awaited::TimedOut => Outcome::Failure("timed out waiting for the response".to_string()),
        Awaited::AlreadyConsumed => Outcome::Failure("response already consumed".to_string()),
    };
    sink.finalize(id, outcome);

    awaited
}

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The person asking about the image.
    User,
    /// The model's answer, or its placeholder.
    Assistant,
}

impl Role {
    /// Returns the role as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single turn of the conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The text shown for the message.
    pub content: String,
}

/// Chat history where assistant answers start out as placeholders.
///
/// Each placeholder is replaced in place when its request resolves, so the
/// order of the conversation stays the order in which questions were asked.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    placeholders: HashMap<TaskId, usize>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user turn at the end of the conversation.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.into(),
        });
    }

    /// Returns the conversation in order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of answers still shown as placeholders.
    pub fn in_flight(&self) -> usize {
        self.placeholders.len()
    }

    /// Forgets the whole conversation, including pending placeholders.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.placeholders.clear();
    }
}

impl DisplaySink for Transcript {
    fn interim(&mut self, id: TaskId, text: &str) {
        if let Some(&index) = self.placeholders.get(&id) {
            self.messages[index].content = text.to_string();
            return;
        }
        self.placeholders.insert(id, self.messages.len());
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: text.to_string(),
        });
    }

    fn finalize(&mut self, id: TaskId, outcome: Outcome<String>) {
        let content = match outcome {
            Outcome::Success(text) => text,
            Outcome::Failure(reason) => format!("❌ Error: {reason}"),
        };
        match self.placeholders.remove(&id) {
            Some(index) => self.messages[index].content = content,
            None => self.messages.push(ChatMessage {
                role: Role::Assistant,
                content,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_replaced_in_place() {
        let mut transcript = Transcript::new();
        transcript.push_user("first?");
        transcript.interim(TaskId::new(1), "processing…");
        transcript.push_user("second?");
        transcript.interim(TaskId::new(2), "processing…");
        assert_eq!(transcript.in_flight(), 2);

        transcript.finalize(TaskId::new(2), Outcome::Success("two".into()));
        transcript.finalize(TaskId::new(1), Outcome::Failure("DecodeError: eof".into()));

        let contents: Vec<_> = transcript
            .messages()
            .iter()
            .map(|m| (m.role.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(
            contents,
            [
                ("user", "first?"),
                ("assistant", "❌ Error: DecodeError: eof"),
                ("user", "second?"),
                ("assistant", "two"),
            ]
        );
        assert_eq!(transcript.in_flight(), 0);
    }

    #[test]
    fn finalize_without_placeholder_appends() {
        let mut transcript = Transcript::new();
        transcript.finalize(TaskId::new(7), Outcome::Success("late".into()));
        assert_eq!(
            transcript.messages(),
            [ChatMessage {
                role: Role::Assistant,
                content: "late".into()
            }]
        );
    }

    #[test]
    fn shared_transcript_is_a_sink() {
        let mut shared = Arc::new(Mutex::new(Transcript::new()));
        shared.interim(TaskId::new(1), "…");
        shared.finalize(TaskId::new(1), Outcome::Success("done".into()));
        let transcript = shared.lock().unwrap();
        assert_eq!(transcript.messages()[0].content, "done");
        assert_eq!(transcript.in_flight(), 0);
    }
}
