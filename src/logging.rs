use chrono::Local;
use env_logger::{ fmt::Color, Builder, Target, WriteStyle };
use log::{ Level, LevelFilter, Record };
use serde_json::json;
use std::env;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;

use crate::cli::Args;

/// Modules whose chatter is capped at `warn` unless `RUST_LOG` says otherwise.
const NOISY_MODULES: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

/// Colored `time | LEVEL | target | message` lines on the console, or JSON lines when
/// `--log-file` is set. `RUST_LOG` wins over `--log-level`.
pub fn init(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let rust_log = env::var("RUST_LOG").ok().filter(|spec| !spec.trim().is_empty());
    let mut builder = filter_builder(rust_log.as_deref(), &args.log_level);
    if let Ok(style) = env::var("RUST_LOG_STYLE") {
        builder.parse_write_style(&style);
    }

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path, e))?;
            builder
                .target(Target::Pipe(Box::new(file)))
                .write_style(WriteStyle::Never)
                .format(|buf, record| writeln!(buf, "{}", json_line(record)));
        }
        None => {
            builder.format(|buf, record| {
                let mut style = buf.style();
                style.set_color(level_color(record.level()));
                if record.level() == Level::Error {
                    style.set_bold(true);
                }
                writeln!(
                    buf,
                    "{} | {:<8} | {} | {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    style.value(record.level()),
                    record.target(),
                    record.args()
                )
            });
        }
    }

    builder.try_init()?;
    Ok(())
}

fn filter_builder(rust_log: Option<&str>, level: &str) -> Builder {
    let mut builder = Builder::new();
    match rust_log {
        Some(spec) => {
            builder.parse_filters(spec);
        }
        None => {
            builder.parse_filters(level);
            for module in NOISY_MODULES {
                builder.filter_module(module, LevelFilter::Warn);
            }
        }
    }
    builder
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Cyan,
        Level::Trace => Color::White,
    }
}

fn json_line(record: &Record) -> String {
    json!({
        "timestamp": Local::now().to_rfc3339(),
        "logger_name": record.target(),
        "level": record.level().to_string(),
        "message": record.args().to_string(),
    }).to_string()
}
