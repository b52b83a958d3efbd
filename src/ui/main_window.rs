use adw::prelude::*;
use adw::Application;
use friendlychat::api::auth::AuthClient;
use friendlychat::api::client::FirebaseClient;
use friendlychat::api::database::RealtimeDatabase;
use friendlychat::api::events::ChatEvent;
use friendlychat::api::remote_config::RemoteConfigClient;
use friendlychat::api::storage::{ObjectStorage, PhotoLoader};
use friendlychat::app::AppConfig;
use friendlychat::config_gate::RemoteConfigGate;
use friendlychat::notifications::{NotificationReceiver, RemoteMessage};
use friendlychat::session::{Directive, FlowOutcome, RequestCode, SessionController};
use friendlychat::utils::{spawn_async, RUNTIME};
use gtk4 as gtk;
use gtk4::gio;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

type Controller = SessionController<RealtimeDatabase, ObjectStorage>;

struct MainWindow {
    window: adw::ApplicationWindow,
    overlay: adw::ToastOverlay,
    chat: crate::ui::chat_view::ChatView,
    controller: RefCell<Controller>,
    auth: Arc<AuthClient>,
    gate: Arc<Mutex<RemoteConfigGate<RemoteConfigClient>>>,
    events: mpsc::UnboundedSender<ChatEvent>,
    auth_listener: RefCell<Option<JoinHandle<()>>>,
    signing_in: Cell<bool>,
    chooser: RefCell<Option<gtk::FileChooserNative>>,
}

pub fn show_main_window(app: &Application, config: AppConfig) {
    let developer_mode = config.developer_mode;
    let backend = FirebaseClient::new(config)
        .and_then(|client| Ok((RealtimeDatabase::new(client.clone())?, client)));
    let (database, client) = match backend {
        Ok(parts) => parts,
        Err(err) => {
            log::error!("backend settings rejected: {}", err);
            crate::ui::setup::show_setup_window(app, AppConfig::load());
            return;
        }
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("FriendlyChat")
        .default_width(720)
        .default_height(640)
        .build();

    let overlay = adw::ToastOverlay::new();
    let chat = crate::ui::chat_view::ChatView::new(PhotoLoader::new(&client));
    overlay.set_child(Some(&chat.widget()));

    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = gtk::Label::new(Some("FriendlyChat"));
    header.set_title_widget(Some(&title));
    let sign_out_btn = gtk::Button::with_label("Sign out");
    header.pack_end(&sign_out_btn);
    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new(
        Arc::new(database),
        Arc::new(ObjectStorage::new(client.clone())),
        events_tx.clone(),
    );
    let gate = RemoteConfigGate::new(RemoteConfigClient::new(client.clone()), developer_mode);

    let this = Rc::new(MainWindow {
        window: window.clone(),
        overlay,
        chat,
        controller: RefCell::new(controller),
        auth: Arc::new(AuthClient::new(client)),
        gate: Arc::new(Mutex::new(gate)),
        events: events_tx,
        auth_listener: RefCell::new(None),
        signing_in: Cell::new(false),
        chooser: RefCell::new(None),
    });

    install_push_action(app);
    {
        let auth = this.auth.clone();
        RUNTIME.spawn(async move { auth.keep_token_fresh().await });
    }
    connect_input(&this);
    {
        let auth = this.auth.clone();
        sign_out_btn.connect_clicked(move |_| auth.sign_out());
    }
    {
        let this = this.clone();
        window.connect_is_active_notify(move |w| {
            if w.is_active() {
                this.fetch_config();
            }
        });
    }
    {
        let this = this.clone();
        window.connect_close_request(move |_| {
            this.pause();
            glib::Propagation::Proceed
        });
    }

    pump_events(this.clone(), events_rx);
    this.refresh();
    window.present();
    this.resume();
}

/// Push messages arrive out-of-band as the `app.push` action carrying a JSON
/// payload (e.g. `gapplication action <app-id> push "'{...}'"`).
fn install_push_action(app: &Application) {
    if app.lookup_action("push").is_some() {
        return;
    }
    let (push_tx, push_rx) = mpsc::channel::<RemoteMessage>(16);
    RUNTIME.spawn(NotificationReceiver.run(push_rx));

    let action = gio::SimpleAction::new("push", Some(glib::VariantTy::STRING));
    action.connect_activate(move |_, param| {
        let Some(payload) = param.and_then(|p| p.get::<String>()) else {
            return;
        };
        match serde_json::from_str::<RemoteMessage>(&payload) {
            Ok(message) => {
                if push_tx.try_send(message).is_err() {
                    log::warn!("push receiver busy, dropping message");
                }
            }
            Err(e) => log::warn!("ignoring malformed push payload: {}", e),
        }
    });
    app.add_action(&action);
}

fn connect_input(this: &Rc<MainWindow>) {
    let chat = &this.chat;
    {
        let this = this.clone();
        chat.entry.connect_changed(move |entry| {
            let can_send = {
                let mut controller = this.controller.borrow_mut();
                controller.form_mut().set_text(&entry.text());
                controller.form().can_send()
            };
            this.chat.send_btn.set_sensitive(can_send);
        });
    }

    let send: Rc<dyn Fn()> = {
        let this = this.clone();
        Rc::new(move || {
            let sent = this.controller.borrow_mut().send_text();
            if sent {
                this.chat.entry.set_text("");
            }
        })
    };
    {
        let send = send.clone();
        chat.send_btn.connect_clicked(move |_| (send)());
    }
    {
        let send = send.clone();
        chat.entry.connect_activate(move |_| (send)());
    }
    {
        let this = this.clone();
        chat.photo_btn.connect_clicked(move |_| this.pick_photo());
    }
}

fn pump_events(this: Rc<MainWindow>, mut events_rx: mpsc::UnboundedReceiver<ChatEvent>) {
    glib::MainContext::default().spawn_local(async move {
        while let Some(event) = events_rx.recv().await {
            let directives = this.controller.borrow_mut().handle(event);
            this.refresh();
            for directive in directives {
                this.apply(directive);
            }
        }
    });
}

impl MainWindow {
    fn refresh(&self) {
        // Entry updates re-enter the controller through `changed`, so release
        // the borrow before touching widgets.
        let (rows, viewer, max_len, enabled, can_send, signed_in) = {
            let controller = self.controller.borrow();
            let form = controller.form();
            // GtkEntry truncates on a lower max length; text already typed stays.
            let widget_limit = form.max_len().max(form.text().chars().count());
            (
                controller.rows(self.chat.chat_width()),
                controller.session().display_name().to_string(),
                i32::try_from(widget_limit).unwrap_or(i32::MAX),
                form.is_enabled(),
                form.can_send(),
                controller.session().is_signed_in(),
            )
        };
        self.chat.show_rows(&rows, &viewer);
        // GtkEntry treats 0 as "unlimited", so a zero limit disables input instead.
        self.chat.entry.set_max_length(max_len);
        self.chat.entry.set_sensitive(enabled && max_len > 0);
        self.chat.send_btn.set_sensitive(can_send);
        self.chat.photo_btn.set_sensitive(signed_in);
    }

    fn apply(self: &Rc<Self>, directive: Directive) {
        match directive {
            Directive::Toast(text) => self.overlay.add_toast(adw::Toast::new(&text)),
            Directive::Finish => self.window.close(),
            Directive::SignInRequired => self.start_sign_in(),
            Directive::RenewAuth => {
                let auth = self.auth.clone();
                spawn_async(async move {
                    if let Err(e) = auth.refresh().await {
                        log::warn!("could not renew credentials: {}", e);
                    }
                });
            }
        }
    }

    fn start_sign_in(self: &Rc<Self>) {
        if self.signing_in.replace(true) {
            return;
        }
        let this = self.clone();
        crate::ui::login::show_sign_in_dialog(&self.window, self.auth.clone(), move |outcome| {
            this.signing_in.set(false);
            this.on_flow_result(RequestCode::SignIn, outcome);
        });
    }

    fn on_flow_result(self: &Rc<Self>, code: RequestCode, outcome: FlowOutcome) {
        let directives = self.controller.borrow_mut().on_flow_result(code, outcome);
        self.refresh();
        for directive in directives {
            self.apply(directive);
        }
    }

    fn pick_photo(self: &Rc<Self>) {
        let chooser = gtk::FileChooserNative::new(
            Some("Complete action using"),
            Some(&self.window),
            gtk::FileChooserAction::Open,
            Some("Send"),
            Some("Cancel"),
        );
        let filter = gtk::FileFilter::new();
        filter.set_name(Some("Images"));
        filter.add_mime_type("image/jpeg");
        filter.add_mime_type("image/png");
        chooser.add_filter(&filter);

        let this = self.clone();
        chooser.connect_response(move |chooser, response| {
            let outcome = match chooser.file().and_then(|f| f.path()) {
                Some(path) if response == gtk::ResponseType::Accept => FlowOutcome::Selected(path),
                _ => FlowOutcome::Cancelled,
            };
            this.on_flow_result(RequestCode::PhotoPicker, outcome);
            this.chooser.replace(None);
        });
        chooser.show();
        self.chooser.replace(Some(chooser));
    }

    fn fetch_config(&self) {
        let gate = self.gate.clone();
        let events = self.events.clone();
        spawn_async(async move {
            let max_message_length = gate.lock().await.fetch(Instant::now()).await;
            let _ = events.send(ChatEvent::ConfigFetched { max_message_length });
        });
    }

    fn resume(&self) {
        self.controller.borrow_mut().resume();
        let mut auth_rx = self.auth.add_auth_state_listener();
        let events = self.events.clone();
        let listener = RUNTIME.spawn(async move {
            while auth_rx.changed().await.is_ok() {
                let user = auth_rx.borrow_and_update().clone();
                if events.send(ChatEvent::AuthStateChanged(user)).is_err() {
                    break;
                }
            }
        });
        if let Some(old) = self.auth_listener.replace(Some(listener)) {
            old.abort();
        }
        self.fetch_config();
    }

    fn pause(&self) {
        if let Some(listener) = self.auth_listener.take() {
            listener.abort();
        }
        self.controller.borrow_mut().pause();
    }
}
