use adw::prelude::*;
use adw::Application;
use friendlychat::app::AppConfig;
use gtk4 as gtk;
use std::rc::Rc;

/// First-run window collecting the backend project settings.
pub fn show_setup_window(app: &Application, current: AppConfig) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("FriendlyChat Setup")
        .default_width(460)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Connect to your Firebase project"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let field = |placeholder: &str, value: &str| {
        let entry = gtk::Entry::new();
        entry.set_placeholder_text(Some(placeholder));
        entry.set_text(value);
        entry.set_hexpand(true);
        entry
    };
    let db_entry = field(
        "Database URL (e.g. https://my-app.firebaseio.com)",
        &current.database_url,
    );
    let key_entry = field("Web API key", &current.api_key);
    let project_entry = field("Project ID", &current.project_id);
    let app_entry = field("App ID", &current.app_id);
    let bucket_entry = field("Storage bucket (e.g. my-app.appspot.com)", &current.storage_bucket);
    let dev_switch = gtk::CheckButton::with_label("Developer mode (always refetch remote config)");
    dev_switch.set_active(current.developer_mode);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    for widget in [&db_entry, &key_entry, &project_entry, &app_entry, &bucket_entry] {
        form.append(widget);
    }
    form.append(&dev_switch);
    root.append(&form);

    let save_btn = gtk::Button::with_label("Save");
    save_btn.add_css_class("suggested-action");
    save_btn.set_halign(gtk::Align::End);
    root.append(&save_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    header.set_title_widget(Some(&gtk::Label::new(Some("FriendlyChat"))));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_save = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let db_entry = db_entry.clone();
        let bucket_entry = bucket_entry.clone();
        move || {
            let mut config = AppConfig {
                api_key: key_entry.text().trim().to_string(),
                project_id: project_entry.text().trim().to_string(),
                app_id: app_entry.text().trim().to_string(),
                database_url: friendlychat::utils::normalize_url(&db_entry.text()),
                storage_bucket: bucket_entry.text().trim().to_string(),
                developer_mode: dev_switch.is_active(),
                instance_id: current.instance_id.clone(),
            };
            if let Err(err) = config.validate() {
                overlay.add_toast(adw::Toast::new(&err.to_string()));
                return;
            }
            config.ensure_instance_id();
            if let Err(err) = config.save() {
                overlay.add_toast(adw::Toast::new(&format!("Failed to save settings: {}", err)));
                return;
            }
            crate::ui::main_window::show_main_window(&app, config);
            window.close();
        }
    };

    let on_save: Rc<dyn Fn()> = Rc::new(on_save);
    {
        let on_save = on_save.clone();
        save_btn.connect_clicked(move |_| (on_save)());
    }
    {
        let on_save = on_save.clone();
        bucket_entry.connect_activate(move |_| (on_save)());
    }
    {
        let on_save = on_save.clone();
        db_entry.connect_activate(move |_| (on_save)());
    }

    window.present();
}
