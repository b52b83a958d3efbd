pub mod chat_view;
pub mod login;
pub mod main_window;
pub mod setup;

use adw::Application;
use friendlychat::app::AppConfig;
use std::future::Future;

pub fn build_ui(app: &Application) {
    let mut config = AppConfig::load();
    if !config.is_configured() {
        setup::show_setup_window(app, config);
        return;
    }
    if config.ensure_instance_id() {
        if let Err(e) = config.save() {
            log::warn!("could not persist instance id: {}", e);
        }
    }
    main_window::show_main_window(app, config);
}

/// Runs `fut` on the I/O runtime and hands its output to `on_done` on the
/// GTK main loop.
pub fn run_async_to_main<T, Fut, F>(fut: Fut, on_done: F)
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    F: FnOnce(T) + 'static,
{
    let handle = friendlychat::utils::RUNTIME.spawn(fut);
    glib::MainContext::default().spawn_local(async move {
        match handle.await {
            Ok(value) => on_done(value),
            Err(e) => log::error!("background task failed: {}", e),
        }
    });
}
