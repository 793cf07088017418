mod editor_webview;
mod theme;
mod window;

use std::path::PathBuf;

use clap::Parser;
use libadwaita as adw;
use libadwaita::prelude::*;

use percy_core::editor_file;
use percy_core::settings;
use percy_editor::assets::AssetServer;

const APP_ID: &str = "com.percy.Editor";

/// Edit a Percy YAML configuration file.
#[derive(Parser, Debug)]
#[command(name = "percy-editor", version)]
struct Cli {
    /// YAML file to edit.
    file: PathBuf,

    /// Project root; `.percyrc` lookup stops here. Defaults to the current
    /// directory.
    #[arg(long)]
    root: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let settings = settings::load();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_filter.as_str()),
    )
    .init();

    let file = match std::fs::canonicalize(&cli.file) {
        Ok(path) if editor_file::accepts_file(&path, settings.max_file_size) => path,
        Ok(path) => {
            eprintln!("{} is not an editable YAML file", path.display());
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{}: {}", cli.file.display(), e);
            std::process::exit(2);
        }
    };
    let root = match cli.root.map_or_else(std::env::current_dir, std::fs::canonicalize) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Invalid project root: {}", e);
            std::process::exit(2);
        }
    };
    if !file.starts_with(&root) {
        log::warn!(
            "{} is outside {}; .percyrc lookup will reach the filesystem root",
            file.display(),
            root.display()
        );
    }

    let assets = AssetServer::from_settings(&settings);
    let app = adw::Application::builder().application_id(APP_ID).build();

    {
        let assets = assets.clone();
        app.connect_startup(move |_app| {
            editor_webview::register_asset_scheme(assets.clone());
        });
    }

    app.connect_activate(move |app| {
        window::build_window(app, &file, &root, &settings, &assets);
    });

    // Arguments are already parsed; keep GTK from parsing them again.
    app.run_with_args::<&str>(&[]);
}
