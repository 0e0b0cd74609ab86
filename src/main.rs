//! # Wayframe demo
//!
//! Opens a window, fills it with a solid colour and repaints on every resize
//! until the compositor closes it or Escape is pressed.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::rc::Rc;
use wayframe::{logging, EngineConfig, KeyAction, Window};

#[derive(Parser, Debug)]
#[command(name = "wayframe")]
#[command(about = "Open a Wayland window and paint it with a solid colour")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/wayframe/wayframe.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Initial width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Initial height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Window title
    #[arg(short, long, default_value = "Test")]
    title: String,

    /// Fill colour as 0xAARRGGBB
    #[arg(long, default_value = "0xFFFFFFFF", value_parser = parse_color)]
    color: u32,

    /// Log pointer and keyboard callbacks
    #[arg(long)]
    trace_input: bool,
}

fn parse_color(text: &str) -> std::result::Result<u32, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix('#'))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid colour {text:?}: {e}"))
}

fn load_config(path: &str) -> EngineConfig {
    match EngineConfig::load(path) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", path);
            config
        }
        Err(e) => {
            debug!("{:#}", e);
            warn!("⚠️  No usable configuration at {}, using defaults", path);
            EngineConfig::default()
        }
    }
}

fn paint(window: &mut Window, color: u32) -> Result<(u32, u32)> {
    let (width, height) = window.dimensions()?;
    let content = vec![color; width as usize * height as usize];
    window.submit_pixels(&content)?;
    debug!("Painted {}x{}", width, height);
    Ok((width, height))
}

fn run(cli: &Cli, config: EngineConfig) -> Result<()> {
    let mut window = Window::create_with_config(cli.width, cli.height, &cli.title, config)
        .context("Failed to create window")?;

    let quit = Rc::new(Cell::new(false));
    let on_key = quit.clone();
    let trace_input = cli.trace_input;
    window.set_key_callback(move |name, action| {
        if trace_input {
            info!("⌨️  {} {:?}", name, action);
        }
        if name == "Escape" && action == KeyAction::Pressed {
            on_key.set(true);
        }
    })?;
    if trace_input {
        window.set_cursor_callback(|x, y| info!("🖱️  cursor {:.1},{:.1}", x, y))?;
        window.set_button_callback(|button, action| info!("🖱️  button {} {:?}", button, action))?;
        window.set_scroll_callback(|dx, dy| info!("🖱️  scroll {:.1},{:.1}", dx, dy))?;
    }

    let mut size = paint(&mut window, cli.color)?;
    while !window.should_close()? && !quit.get() {
        if window.dimensions()? != size {
            size = paint(&mut window, cli.color)?;
        }
    }

    if let Some(reason) = window.close_reason() {
        info!("Window stopped: {:?}", reason);
    }
    let stats = window.frame_stats();
    info!(
        "📊 {} frames presented, {} coalesced, {} idle",
        stats.presented, stats.coalesced, stats.idle_frames
    );
    window.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config);
    logging::init(cli.debug || config.general.debug);

    info!("🚀 Starting Wayframe");
    info!(
        "📄 Version: {} ({} {})",
        wayframe::VERSION,
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_DATE").unwrap_or("")
    );

    if let Err(e) = run(&cli, config) {
        error!("❌ {:#}", e);
        return Err(e);
    }

    info!("👋 Goodbye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["wayframe"]).unwrap();
        assert!(!cli.debug);
        assert_eq!((cli.width, cli.height), (800, 600));
        assert_eq!(cli.title, "Test");
        assert_eq!(cli.color, 0xFFFF_FFFF);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "wayframe",
            "--debug",
            "--width",
            "320",
            "--height",
            "240",
            "--title",
            "Hello",
            "--color",
            "#ff336699",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!((cli.width, cli.height), (320, 240));
        assert_eq!(cli.title, "Hello");
        assert_eq!(cli.color, 0xFF33_6699);
    }

    #[test]
    fn test_bad_color_rejected() {
        assert!(Cli::try_parse_from(["wayframe", "--color", "purple"]).is_err());
        assert_eq!(parse_color("00ff00"), Ok(0x0000_FF00));
    }

    #[test]
    fn test_missing_config_falls_back() {
        let config = load_config("/nonexistent/wayframe.toml");
        assert_eq!(config, EngineConfig::default());
    }
}
