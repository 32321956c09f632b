mod app;
pub mod profiling;

pub use app::SpatialAudioDemo;

/// Run the GUI demo
pub fn run() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 650.0])
            .with_title("EarMix Binaural Demo"),
        ..Default::default()
    };

    eframe::run_native(
        "EarMix Binaural Demo",
        options,
        Box::new(|_cc| Ok(Box::new(SpatialAudioDemo::new()))),
    )
}
