#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod audio;
mod bootstrap;
mod config;
mod geometry;
mod model_download;
mod pipeline;
mod pool;
mod random;
mod scene;
mod session;
mod types;
mod ui;

use anyhow::Result;
use clap::Parser;
use gpui::Application;

use config::{AppConfig, Cli};

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::from_cli(Cli::parse());
    log::info!("configuration: {config:?}");

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
