mod ui;

use adw::prelude::*;
use adw::Application;

const APP_ID: &str = "com.google.firebase.udacity.FriendlyChat";

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    // GTK callbacks spawn onto the shared runtime.
    let _guard = friendlychat::utils::RUNTIME.enter();

    let app = Application::builder().application_id(APP_ID).build();
    app.connect_activate(|app| {
        crate::ui::build_ui(app);
    });
    app.run()
}
