use adw::prelude::*;
use friendlychat::api::auth::AuthClient;
use friendlychat::session::FlowOutcome;
use gtk4 as gtk;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// Delegated sign-in flow. `on_result` is called exactly once: `Completed`
/// after a successful sign-in or sign-up, `Cancelled` if the dialog is closed.
pub fn show_sign_in_dialog<F>(parent: &adw::ApplicationWindow, auth: Arc<AuthClient>, on_result: F)
where
    F: Fn(FlowOutcome) + 'static,
{
    let window = adw::Window::builder()
        .transient_for(parent)
        .modal(true)
        .title("Sign in")
        .default_width(420)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Sign in to FriendlyChat"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let email_entry = gtk::Entry::new();
    email_entry.set_placeholder_text(Some("Email"));
    email_entry.set_input_purpose(gtk::InputPurpose::Email);
    email_entry.set_hexpand(true);

    let pass_entry = gtk::PasswordEntry::new();
    pass_entry.set_placeholder_text(Some("Password"));
    pass_entry.set_hexpand(true);

    let name_entry = gtk::Entry::new();
    name_entry.set_placeholder_text(Some("Display name (new accounts)"));
    name_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&email_entry);
    form.append(&pass_entry);
    form.append(&name_entry);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("dim-label");
    status.set_halign(gtk::Align::Start);
    root.append(&status);

    let buttons = gtk::Box::new(gtk::Orientation::Horizontal, 8);
    buttons.set_halign(gtk::Align::End);
    let create_btn = gtk::Button::with_label("Create account");
    let sign_in_btn = gtk::Button::with_label("Sign in");
    sign_in_btn.add_css_class("suggested-action");
    buttons.append(&create_btn);
    buttons.append(&sign_in_btn);
    root.append(&buttons);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    container.append(&adw::HeaderBar::new());
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_result = Rc::new(on_result);
    let finished = Rc::new(Cell::new(false));

    let submit = {
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let on_result = on_result.clone();
        let finished = finished.clone();
        let email_entry = email_entry.clone();
        let pass_entry = pass_entry.clone();
        let name_entry = name_entry.clone();
        let status = status.clone();
        move |create: bool| {
            let email = email_entry.text().trim().to_string();
            let password = pass_entry.text().to_string();
            let name = name_entry.text().trim().to_string();
            if email.is_empty() || password.is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter email and password."));
                return;
            }
            status.set_label(if create { "Creating account…" } else { "Signing in…" });

            let auth = auth.clone();
            let status = status.clone();
            let overlay = overlay.clone();
            let window = window.clone();
            let on_result = on_result.clone();
            let finished = finished.clone();
            super::run_async_to_main(
                async move {
                    if create {
                        auth.sign_up(&email, &password, &name).await
                    } else {
                        auth.sign_in(&email, &password).await
                    }
                },
                move |res| match res {
                    Ok(_) => {
                        finished.set(true);
                        (on_result)(FlowOutcome::Completed);
                        window.close();
                    }
                    Err(err) => {
                        log::warn!("sign-in failed: {}", err);
                        status.set_label("Sign-in failed");
                        overlay.add_toast(adw::Toast::new(&err.to_string()));
                    }
                },
            );
        }
    };

    let submit: Rc<dyn Fn(bool)> = Rc::new(submit);
    {
        let submit = submit.clone();
        sign_in_btn.connect_clicked(move |_| (submit)(false));
    }
    {
        let submit = submit.clone();
        create_btn.connect_clicked(move |_| (submit)(true));
    }
    {
        let submit = submit.clone();
        pass_entry.connect_activate(move |_| (submit)(false));
    }

    window.connect_close_request(move |_| {
        if !finished.replace(true) {
            (on_result)(FlowOutcome::Cancelled);
        }
        glib::Propagation::Proceed
    });

    window.present();
}
