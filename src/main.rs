use node_lens::gui::frontend::LensApp;
use node_lens::persistence::persist;
use node_lens::persistence::settings::AppSettings;

use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();
    // Resolve settings once and hand them to the persistence layer so the
    // autosave directory stays consistent for the whole run
    let settings = AppSettings::load().unwrap_or_default();
    persist::set_settings_override(settings);
    let loaded_session = persist::load_active().ok().flatten();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 710.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Node-Lens",
        options,
        Box::new(move |_cc| {
            if let Some(session) = loaded_session {
                Ok(Box::new(LensApp::from_session(session)) as Box<dyn eframe::App>)
            } else {
                // No prior session: start with the built-in sample document
                Ok(Box::new(LensApp::with_sample()) as Box<dyn eframe::App>)
            }
        }),
    )
}
