use crate::api::models::Message;

/// Messages observed so far, in arrival order.
///
/// Only the feed synchronizer appends and only the session controller
/// clears; both run on the UI thread.
#[derive(Debug, Default, Clone)]
pub struct Feed {
    messages: Vec<Message>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
