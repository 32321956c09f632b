mod cli;
mod gui;
mod tones;

fn main() -> anyhow::Result<()> {
    // Check if CLI mode is requested via command line argument
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--cli" {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        cli::run_cli_tests()
    } else {
        gui::run().map_err(|e| anyhow::anyhow!("GUI failed: {}", e))
    }
}
