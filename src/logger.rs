use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// `RUST_LOG`, when set, wins over `level`.
pub fn init(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_env(Env::default());

    if builder.try_init().is_err() {
        return;
    }
    log::debug!("Logger initialized at {}.", level);
}
