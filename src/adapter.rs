use crate::api::models::{Message, MessageContent};
use crate::feed::Feed;
use crate::session::Session;

/// Share of the chat width given to a photo.
pub const IMAGE_WIDTH_RATIO: f32 = 0.75;

/// Own messages are laid out on the right, everyone else's on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Own,
    Other,
}

/// Exactly one region is shown per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowContent {
    Text(String),
    Image { url: String, width: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub side: Side,
    pub author: String,
    pub content: RowContent,
}

impl RowView {
    pub fn is_own(&self) -> bool {
        self.side == Side::Own
    }

    pub fn shows_text(&self) -> bool {
        matches!(self.content, RowContent::Text(_))
    }

    pub fn shows_image(&self) -> bool {
        matches!(self.content, RowContent::Image { .. })
    }
}

pub fn render_row(message: &Message, session: &Session, chat_width: i32) -> RowView {
    let side = if message.author() == session.display_name() {
        Side::Own
    } else {
        Side::Other
    };
    log::trace!(
        "render_row: session = {}, author = {}, side = {:?}",
        session.display_name(),
        message.author(),
        side
    );

    let content = match message.content() {
        MessageContent::Photo(url) => RowContent::Image {
            url: url.to_string(),
            width: (chat_width.max(0) as f32 * IMAGE_WIDTH_RATIO) as i32,
        },
        MessageContent::Text(text) => RowContent::Text(text.to_string()),
        MessageContent::Empty => RowContent::Text(String::new()),
    };

    RowView {
        side,
        author: message.author().to_string(),
        content,
    }
}

pub fn rows(feed: &Feed, session: &Session, chat_width: i32) -> Vec<RowView> {
    feed.iter()
        .map(|message| render_row(message, session, chat_width))
        .collect()
}

/// What a list view has to do to catch up with the current rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPlan {
    /// Nothing changed since the last render.
    Unchanged,
    /// Build `rows[from..]` and append them.
    Append { from: usize },
    /// Drop every displayed row and build all of them again.
    Rebuild,
}

/// Tracks how many rows a view has on screen and which viewer they were
/// rendered for. The feed only grows between clears, but a new display name
/// flips the side of rows already shown.
#[derive(Debug, Default)]
pub struct RenderCursor {
    rendered: usize,
    viewer: String,
}

impl RenderCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&mut self, row_count: usize, viewer: &str) -> RenderPlan {
        let plan = if row_count < self.rendered || (self.rendered > 0 && self.viewer != viewer) {
            RenderPlan::Rebuild
        } else if row_count == self.rendered {
            RenderPlan::Unchanged
        } else {
            RenderPlan::Append { from: self.rendered }
        };
        self.rendered = row_count;
        if self.viewer != viewer {
            self.viewer = viewer.to_string();
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ANONYMOUS;

    #[test]
    fn photo_message_shows_only_image() {
        let row = render_row(
            &Message::photo("Bob", "https://example.com/p.jpg"),
            &Session::signed_in("Alice"),
            400,
        );
        assert!(row.shows_image());
        assert!(!row.shows_text());
        assert_eq!(
            row.content,
            RowContent::Image {
                url: "https://example.com/p.jpg".into(),
                width: 300
            }
        );
    }

    #[test]
    fn text_message_shows_only_text() {
        let row = render_row(&Message::text("Bob", "yo"), &Session::signed_in("Bob"), 400);
        assert!(row.shows_text());
        assert!(!row.shows_image());
        assert_eq!(row.author, "Bob");
    }

    #[test]
    fn side_follows_session_display_name() {
        let hi = Message::text("Alice", "hi");
        assert_eq!(render_row(&hi, &Session::signed_in("Alice"), 0).side, Side::Own);
        assert_eq!(render_row(&hi, &Session::signed_in("Bob"), 0).side, Side::Other);
        assert_eq!(render_row(&hi, &Session::default(), 0).side, Side::Other);
    }

    #[test]
    fn rows_keep_feed_order() {
        let mut feed = Feed::new();
        feed.push(Message::text("A", "1"));
        feed.push(Message::photo("B", "u"));
        let session = Session::signed_in("A");
        let out = rows(&feed, &session, 100);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_own() && out[0].shows_text());
        assert!(!out[1].is_own() && out[1].shows_image());
    }

    #[test]
    fn cursor_appends_only_new_rows() {
        let mut cursor = RenderCursor::new();
        assert_eq!(cursor.plan(2, "Alice"), RenderPlan::Append { from: 0 });
        assert_eq!(cursor.plan(2, "Alice"), RenderPlan::Unchanged);
        assert_eq!(cursor.plan(5, "Alice"), RenderPlan::Append { from: 2 });
        assert_eq!(cursor.plan(0, ANONYMOUS), RenderPlan::Rebuild);
        assert_eq!(cursor.plan(1, ANONYMOUS), RenderPlan::Append { from: 0 });
    }

    #[test]
    fn cursor_rebuilds_when_the_viewer_is_renamed() {
        let mut cursor = RenderCursor::new();
        cursor.plan(3, "Alice");
        assert_eq!(cursor.plan(3, "Alicia"), RenderPlan::Rebuild);
        assert_eq!(cursor.plan(4, "Alicia"), RenderPlan::Append { from: 3 });
    }
}
