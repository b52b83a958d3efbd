use crate::config_gate::DEFAULT_MSG_LENGTH_LIMIT;

/// State of the message input row.
#[derive(Debug, Clone)]
pub struct ComposeForm {
    text: String,
    max_len: usize,
    enabled: bool,
}

impl Default for ComposeForm {
    fn default() -> Self {
        Self {
            text: String::new(),
            max_len: DEFAULT_MSG_LENGTH_LIMIT as usize,
            enabled: false,
        }
    }
}

impl ComposeForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Changes the limit for future input; text already entered is kept.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    /// Appends as much of `input` as fits under the limit and returns the
    /// number of characters accepted.
    pub fn insert(&mut self, input: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let room = self.max_len.saturating_sub(self.text.chars().count());
        let accepted: String = input.chars().take(room).collect();
        let count = accepted.chars().count();
        self.text.push_str(&accepted);
        count
    }

    /// Replaces the whole text (entry widgets report their full contents on
    /// every change). The text may not grow past the limit, but text that
    /// was already longer than a lowered limit is kept.
    pub fn set_text(&mut self, text: &str) {
        let cap = self.max_len.max(self.text.chars().count());
        self.text.clear();
        if self.enabled {
            self.text.extend(text.chars().take(cap));
        }
    }

    pub fn can_send(&self) -> bool {
        self.enabled && !self.text.trim().is_empty()
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}
