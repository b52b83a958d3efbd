use friendlychat::adapter::{RenderCursor, RenderPlan, RowContent, RowView, Side};
use friendlychat::api::storage::PhotoLoader;
use gtk4 as gtk;
use gtk4::gdk;
use gtk4::prelude::*;
use std::cell::RefCell;

const FALLBACK_WIDTH: i32 = 480;
const LOADING_ICON: &str = "media-playback-pause-symbolic";
const ERROR_ICON: &str = "dialog-warning-symbolic";

pub struct ChatView {
    root: gtk::Box,
    scroller: gtk::ScrolledWindow,
    messages_box: gtk::Box,
    pub entry: gtk::Entry,
    pub send_btn: gtk::Button,
    pub photo_btn: gtk::Button,
    cursor: RefCell<RenderCursor>,
    loader: PhotoLoader,
}

impl ChatView {
    pub fn new(loader: PhotoLoader) -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .build();
        let messages_box = gtk::Box::new(gtk::Orientation::Vertical, 6);
        scroller.set_child(Some(&messages_box));
        root.append(&scroller);

        // Input row
        let input_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let photo_btn = gtk::Button::from_icon_name("insert-image-symbolic");
        photo_btn.set_tooltip_text(Some("Send a photo"));
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type a message…"));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        send_btn.set_sensitive(false);
        input_row.append(&photo_btn);
        input_row.append(&entry);
        input_row.append(&send_btn);
        root.append(&input_row);

        Self {
            root,
            scroller,
            messages_box,
            entry,
            send_btn,
            photo_btn,
            cursor: RefCell::new(RenderCursor::new()),
            loader,
        }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn chat_width(&self) -> i32 {
        match self.scroller.width() {
            w if w > 0 => w,
            _ => FALLBACK_WIDTH,
        }
    }

    /// Brings the list up to date with `rows`, as seen by `viewer`.
    pub fn show_rows(&self, rows: &[RowView], viewer: &str) {
        let plan = self.cursor.borrow_mut().plan(rows.len(), viewer);
        let from = match plan {
            RenderPlan::Unchanged => return,
            RenderPlan::Append { from } => from,
            RenderPlan::Rebuild => {
                while let Some(child) = self.messages_box.first_child() {
                    self.messages_box.remove(&child);
                }
                0
            }
        };
        for row in &rows[from..] {
            self.messages_box.append(&self.build_row(row));
        }

        let adj = self.scroller.vadjustment();
        glib::idle_add_local_once(move || adj.set_value(adj.upper()));
    }

    fn build_row(&self, row: &RowView) -> gtk::Widget {
        let bubble = gtk::Box::new(gtk::Orientation::Vertical, 2);
        bubble.add_css_class("card");
        bubble.set_margin_start(6);
        bubble.set_margin_end(6);
        let align = match row.side {
            Side::Own => gtk::Align::End,
            Side::Other => gtk::Align::Start,
        };
        bubble.set_halign(align);

        match &row.content {
            RowContent::Text(text) => {
                let lbl = gtk::Label::new(Some(text));
                lbl.set_wrap(true);
                lbl.set_selectable(true);
                lbl.set_xalign(0.0);
                lbl.set_margin_top(6);
                lbl.set_margin_start(8);
                lbl.set_margin_end(8);
                bubble.append(&lbl);
            }
            RowContent::Image { url, width } => {
                bubble.append(&self.build_photo(url, *width));
            }
        }

        let author = gtk::Label::new(Some(&row.author));
        author.add_css_class("caption");
        author.add_css_class("dim-label");
        author.set_halign(align);
        author.set_margin_start(8);
        author.set_margin_end(8);
        author.set_margin_bottom(4);
        bubble.append(&author);
        bubble.upcast()
    }

    fn build_photo(&self, url: &str, width: i32) -> gtk::Widget {
        let holder = gtk::Box::new(gtk::Orientation::Vertical, 0);
        let placeholder = gtk::Image::from_icon_name(LOADING_ICON);
        placeholder.set_pixel_size(48);
        holder.append(&placeholder);

        let loader = self.loader.clone();
        let fetch_url = url.to_string();
        let url = url.to_string();
        let holder_for_done = holder.clone();
        super::run_async_to_main(
            async move { loader.load(&fetch_url).await },
            move |res| {
                let texture = res.map_err(|e| e.to_string()).and_then(|bytes| {
                    gdk::Texture::from_bytes(&glib::Bytes::from_owned(bytes))
                        .map_err(|e| e.to_string())
                });
                match texture {
                    Ok(texture) => {
                        let picture = gtk::Picture::for_paintable(&texture);
                        picture.set_can_shrink(true);
                        picture.set_size_request(width, width * 3 / 4);
                        holder_for_done.remove(&placeholder);
                        holder_for_done.append(&picture);
                    }
                    Err(e) => {
                        log::warn!("could not load photo {}: {}", url, e);
                        placeholder.set_icon_name(Some(ERROR_ICON));
                    }
                }
            },
        );
        holder.upcast()
    }
}
