use crate::adapter::{self, RowView};
use crate::api::database::MessageStore;
use crate::api::events::{ChatEvent, SyncEvent, SyncEventKind};
use crate::api::models::{AuthUser, Message};
use crate::api::storage::PhotoStore;
use crate::compose::ComposeForm;
use crate::config_gate;
use crate::feed::Feed;
use crate::sync::FeedSynchronizer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Display name used while nobody is signed in.
pub const ANONYMOUS: &str = "anonymous";

/// Who is chatting right now. Changed only by [`SessionController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    display_name: String,
    signed_in: bool,
    epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            display_name: ANONYMOUS.to_string(),
            signed_in: false,
            epoch: 0,
        }
    }
}

impl Session {
    pub fn signed_in(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            signed_in: true,
            epoch: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    /// Bumped on every sign-in and sign-out; work started under an older
    /// epoch is discarded when it completes.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Delegated flows whose result comes back asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RequestCode {
    SignIn = 1001,
    PhotoPicker = 1002,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    Selected(PathBuf),
    Cancelled,
}

/// What the host view has to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Show the delegated sign-in UI and report back with [`RequestCode::SignIn`].
    SignInRequired,
    Toast(String),
    /// Close the hosting view.
    Finish,
    /// The backend revoked the feed stream's credentials; refresh the ID token
    /// and republish the auth state so the feed can reopen.
    RenewAuth,
}

/// SignedOut/SignedIn state machine that owns the feed, the compose form and
/// the feed listener. Every method runs on the UI thread.
pub struct SessionController<S, P> {
    session: Session,
    feed: Feed,
    form: ComposeForm,
    sync: FeedSynchronizer<S>,
    photos: Arc<P>,
    events: UnboundedSender<ChatEvent>,
    active: bool,
}

impl<S: MessageStore, P: PhotoStore> SessionController<S, P> {
    pub fn new(store: Arc<S>, photos: Arc<P>, events: UnboundedSender<ChatEvent>) -> Self {
        Self {
            session: Session::default(),
            feed: Feed::new(),
            form: ComposeForm::new(),
            sync: FeedSynchronizer::new(store, events.clone()),
            photos,
            events,
            active: true,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn form(&self) -> &ComposeForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ComposeForm {
        &mut self.form
    }

    pub fn is_listening(&self) -> bool {
        self.sync.is_attached()
    }

    pub fn rows(&self, chat_width: i32) -> Vec<RowView> {
        adapter::rows(&self.feed, &self.session, chat_width)
    }

    pub fn handle(&mut self, event: ChatEvent) -> Vec<Directive> {
        match event {
            ChatEvent::AuthStateChanged(user) => self.on_auth_state_changed(user),
            ChatEvent::Feed(event) => self.on_feed_event(event),
            ChatEvent::PhotoUploaded { epoch, url } => {
                self.on_photo_uploaded(epoch, url);
                Vec::new()
            }
            ChatEvent::ConfigFetched { max_message_length } => {
                config_gate::apply_limit(max_message_length, &mut self.form);
                Vec::new()
            }
        }
    }

    pub fn on_auth_state_changed(&mut self, user: Option<AuthUser>) -> Vec<Directive> {
        if !self.active {
            log::debug!("auth state change while paused, ignoring");
            return Vec::new();
        }
        match user {
            Some(user) => {
                let name = user.chat_name().unwrap_or(ANONYMOUS).to_string();
                self.on_signed_in(name);
                Vec::new()
            }
            None => {
                self.on_signed_out();
                vec![Directive::SignInRequired]
            }
        }
    }

    fn on_signed_in(&mut self, display_name: String) {
        if !self.session.signed_in || self.session.display_name != display_name {
            self.session.epoch += 1;
            log::info!("signed in as {}", display_name);
        }
        self.session.display_name = display_name;
        self.session.signed_in = true;
        self.form.set_enabled(true);
        if !self.sync.is_attached() {
            // A new stream starts with a snapshot of the whole collection.
            self.feed.clear();
            self.sync.attach();
        }
    }

    fn on_feed_event(&mut self, event: SyncEvent) -> Vec<Directive> {
        let revoked = self.sync.epoch() == Some(event.epoch)
            && matches!(&event.kind, SyncEventKind::Closed(reason) if reason.starts_with("auth_revoked"));
        self.sync.accept(event, &mut self.feed);
        if revoked && self.active && self.session.signed_in {
            vec![Directive::RenewAuth]
        } else {
            Vec::new()
        }
    }

    fn on_signed_out(&mut self) {
        log::info!("signed out");
        self.session.display_name = ANONYMOUS.to_string();
        self.session.signed_in = false;
        self.session.epoch += 1;
        self.feed.clear();
        self.sync.detach();
        self.form.set_enabled(false);
    }

    pub fn on_flow_result(&mut self, code: RequestCode, outcome: FlowOutcome) -> Vec<Directive> {
        match (code, outcome) {
            (RequestCode::SignIn, FlowOutcome::Cancelled) => {
                vec![Directive::Toast("Signed out".into()), Directive::Finish]
            }
            (RequestCode::SignIn, _) => vec![Directive::Toast("Signed in".into())],
            (RequestCode::PhotoPicker, FlowOutcome::Selected(path)) => {
                self.upload_photo(path);
                Vec::new()
            }
            (RequestCode::PhotoPicker, _) => Vec::new(),
        }
    }

    /// Posts the compose text as the current user and clears the form.
    /// Returns false when there is nothing sendable.
    pub fn send_text(&mut self) -> bool {
        if !self.form.can_send() {
            return false;
        }
        let text = self.form.take();
        self.sync
            .post(Message::text(self.session.display_name.clone(), text));
        true
    }

    /// Uploads in the background; the result comes back as
    /// [`ChatEvent::PhotoUploaded`] tagged with the current session epoch.
    pub fn upload_photo(&self, path: PathBuf) {
        if !self.session.signed_in {
            log::warn!("photo picked while signed out, ignoring");
            return;
        }
        let epoch = self.session.epoch;
        let photos = Arc::clone(&self.photos);
        let events = self.events.clone();
        tokio::spawn(async move {
            match photos.upload(path).await {
                Ok(url) => {
                    let _ = events.send(ChatEvent::PhotoUploaded { epoch, url });
                }
                Err(e) => log::error!("photo upload failed: {}", e),
            }
        });
    }

    fn on_photo_uploaded(&mut self, epoch: u64, url: String) {
        if !self.active || !self.session.signed_in || epoch != self.session.epoch {
            log::debug!("dropping photo upload from epoch {}", epoch);
            return;
        }
        self.sync
            .post(Message::photo(self.session.display_name.clone(), url));
    }

    /// Host view went to the background: stop listening and drop the feed.
    pub fn pause(&mut self) {
        self.active = false;
        self.sync.detach();
        self.feed.clear();
    }

    /// Host view is back; the caller re-delivers the current auth state.
    pub fn resume(&mut self) {
        self.active = true;
    }
}
