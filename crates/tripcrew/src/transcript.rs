use tokio::sync::mpsc::UnboundedSender;

use crate::models::message::Message;
use crate::models::role::Role;

/// Append-only, ordered log of one conversation.
///
/// Entries are never edited or removed once appended; their position is the timeline.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    observer: Option<UnboundedSender<Message>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a copy of every appended message to `observer`
    pub fn with_observer(mut self, observer: UnboundedSender<Message>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Append a message and return its index
    pub fn append(&mut self, message: Message) -> usize {
        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is watching anymore
            if observer.send(message.clone()).is_err() {
                self.observer = None;
            }
        }
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn filter<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Message> + 'a
    where
        P: Fn(&Message) -> bool + 'a,
    {
        self.messages.iter().filter(move |m| predicate(m))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_content_bearing(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_content_bearing())
    }

    /// The view handed to a backend: the opening request plus the most recent
    /// `recent` messages. Tool results whose request fell outside the window are dropped.
    pub fn window(&self, recent: usize) -> Vec<Message> {
        if self.messages.len() <= recent + 1 {
            return self.messages.clone();
        }

        let tail_start = self.messages.len() - recent;
        let mut view = Vec::with_capacity(recent + 1);
        view.push(self.messages[0].clone());

        let mut tail = self.messages[tail_start..].iter().peekable();
        while let Some(message) = tail.peek() {
            if message.role == Role::Tool {
                tail.next();
            } else {
                break;
            }
        }
        view.extend(tail.cloned());
        view
    }

    /// Human-readable rendering of the whole conversation
    pub fn render_log(&self) -> String {
        let mut log = String::new();
        for (index, message) in self.messages.iter().enumerate() {
            log.push_str(&format!("[{}] {}:\n", index, message.speaker));
            if !message.content.is_empty() {
                log.push_str(&message.content);
                log.push('\n');
            }
            if let Some(call) = &message.tool_call {
                log.push_str(&format!(
                    "-> requested tool {} ({}) with {}\n",
                    call.name, call.id, call.arguments
                ));
            }
            if let Some(result) = &message.tool_result {
                log.push_str(&format!(
                    "<- {} ({}):\n{}\n",
                    result.tool_name,
                    result.call_id,
                    result.as_text()
                ));
            }
            log.push('\n');
        }
        log
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
