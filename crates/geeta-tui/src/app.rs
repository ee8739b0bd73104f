use geeta_core::{ChatClient, ChatSession, ChatUpdate};

/// Scroll step for PageUp/PageDown
const PAGE_SCROLL: u16 = 10;

pub struct App {
    pub session: ChatSession,
    pub server_url: String,
    pub input: String,
    /// Cursor position in characters, not bytes
    pub cursor: usize,
    pub scroll: u16,
    /// Keep the newest line in view while an answer streams in
    pub follow: bool,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,
    pub should_quit: bool,
}

impl App {
    pub fn new(server_url: &str) -> Self {
        Self {
            session: ChatSession::new(ChatClient::new(server_url)),
            server_url: server_url.to_string(),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            should_quit: false,
        }
    }

    /// Send the input line; returns false if nothing was sent.
    pub fn submit_input(&mut self) -> bool {
        if !self.session.submit(&self.input) {
            return false;
        }
        self.input.clear();
        self.cursor = 0;
        self.follow = true;
        self.scroll_to_bottom();
        true
    }

    pub fn on_update(&mut self, _update: ChatUpdate) {
        if self.follow {
            self.scroll_to_bottom();
        }
    }

    /// The newest answer is still empty and streaming.
    pub fn is_thinking(&self) -> bool {
        self.session.is_pending()
            && self
                .session
                .messages()
                .last()
                .is_some_and(|m| m.content.is_empty())
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow = self.scroll >= max;
    }

    pub fn page_up(&mut self) {
        self.scroll_up(PAGE_SCROLL);
    }

    pub fn page_down(&mut self) {
        self.scroll_down(PAGE_SCROLL);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Rendered line count of the history, including wrapping.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: usize = 0;
        for msg in self.session.messages() {
            total += 1; // "You:" or "AI:"
            if msg.content.is_empty() {
                total += 1; // placeholder or "Thinking..."
            }
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                total += char_count / wrap_width + 1;
            }
            total += 1;
        }
        total.min(u16::MAX as usize) as u16
    }
}
