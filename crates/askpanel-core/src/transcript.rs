//! The scrolling question/answer log shown in the panel.

/// Turns kept on screen before the log starts over.
pub const ROLLOVER_TURNS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    text: String,
    turns: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new exchange, wiping the log first once it holds more than
    /// [`ROLLOVER_TURNS`] turns.
    pub fn begin_turn(&mut self, question: &str, label: &str) {
        self.turns += 1;
        if self.turns > ROLLOVER_TURNS {
            self.text.clear();
            self.turns = 1;
        }
        self.push_line(&format!("Q: {}", question));
        self.push_line(label);
    }

    pub fn push_answer(&mut self, answer: &str) {
        self.push_line(&format!("A: {}", answer));
    }

    pub fn push_separator(&mut self) {
        self.text.push('\n');
    }

    pub fn push_error(&mut self, message: &str) {
        self.push_line(&format!("Error: {}", message));
    }

    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.turns = 0;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
