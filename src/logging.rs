//! Log setup: every record goes to stderr and is appended to a log file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Env, Target};

/// Install the global logger. The level defaults to `info` and can be
/// changed through `RUST_LOG`.
pub fn init(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "{} [{}] {}", buf.timestamp(), record.level(), record.args())
        })
        .target(Target::Pipe(Box::new(Tee::new(io::stderr(), file))))
        .try_init()?;
    Ok(())
}

/// Writes everything to both inner writers.
struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    #[cfg(test)]
    fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

#[test]
fn test_tee_writes_both() {
    let mut tee = Tee::new(Vec::new(), Vec::new());
    write!(tee, "Battery Level: {}%", 45).unwrap();
    tee.flush().unwrap();

    let (first, second) = tee.into_inner();
    assert_eq!(first, b"Battery Level: 45%");
    assert_eq!(first, second);
}
