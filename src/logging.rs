//! Log file layout (spec §6): a fresh file per start at
//! `./logs/{service_name}.log` plus stdout, with third-party targets
//! pinned to `WARN`, suppressible via `MANAGED_BY_MONITOR`.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Writes every log line to the log file, and additionally to stdout
/// unless the process is under monitor supervision.
#[derive(Clone)]
struct DualWriter {
    file: Arc<Mutex<File>>,
    echo_stdout: bool,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.lock().expect("log file mutex poisoned").write(buf)?;
        if self.echo_stdout {
            io::stdout().write_all(buf)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().expect("log file mutex poisoned").flush()?;
        if self.echo_stdout {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

const THIRD_PARTY_WARN_TARGETS: &[&str] = &["hyper", "reqwest", "redis", "tokio_tungstenite"];

/// Builds the default `EnvFilter`: `info` for this crate's own targets,
/// `warn` for the third-party transport stack, overridable by `RUST_LOG`.
fn default_filter() -> EnvFilter {
    let mut filter = EnvFilter::new("info");
    for target in THIRD_PARTY_WARN_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse().expect("static directive is valid"));
    }
    filter
}

/// Initializes the global tracing subscriber. `service_name` selects the
/// log file (`./logs/{service_name}.log`, truncated on every call — a
/// fresh file per start, not rotation). When `managed_by_monitor` is set
/// stdout output is suppressed and only the file sink is used, matching a
/// supervised process whose console is owned by something else.
pub fn init(service_name: &str, managed_by_monitor: bool) -> std::io::Result<()> {
    std::fs::create_dir_all("./logs")?;
    let log_path = Path::new("./logs").join(format!("{service_name}.log"));
    let file = File::create(log_path)?;

    let filter = std::env::var("RUST_LOG").ok().map(EnvFilter::new).unwrap_or_else(default_filter);
    let writer = DualWriter { file: Arc::new(Mutex::new(file)), echo_stdout: !managed_by_monitor };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_pins_every_documented_target() {
        let filter = default_filter().to_string();
        for target in THIRD_PARTY_WARN_TARGETS {
            assert!(filter.contains(&format!("{target}=warn")), "missing directive for {target}");
        }
    }
}
