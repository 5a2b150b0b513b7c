use clap::Parser;
use putzfish::{config, output, pipeline};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "putzfish")]
#[command(about = "Optimize a static website export for deployment")]
#[command(long_about = "\
Optimize a static website export for deployment

The export directory is only read. Results go to a sibling directory named
'optimiert', which is deleted and rebuilt on every run.

Expected layout:

  site/
  ├── index.html                   # Markup anywhere in the tree
  ├── support/
  │   ├── style.css                # → style.min.css
  │   ├── global_style.css         # → global_style.min.css, unused selectors removed
  │   └── app.js                   # → app.min.js
  └── media/
      └── photo.jpg                # Re-encoded in place when smaller

References in the markup are rewritten to the .min files.

Run 'putzfish --gen-config' to print a documented settings file.")]
#[command(version)]
struct Cli {
    /// Exported site directory
    #[arg(long, required_unless_present = "gen_config")]
    input: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a stock settings file with all options documented
    #[arg(long, conflicts_with_all = ["input", "config"])]
    gen_config: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }
    let Some(input) = cli.input else {
        return Err("--input is required".into());
    };

    let settings = config::load_settings(cli.config.as_deref())?;
    init_thread_pool(&settings.processing);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_event(&event);
        }
    });
    let result = pipeline::optimize(&input, settings, Some(tx));
    // The sender is dropped inside `optimize`, which ends the printer loop.
    if printer.join().is_err() {
        return Err("output thread panicked".into());
    }
    result?;

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
