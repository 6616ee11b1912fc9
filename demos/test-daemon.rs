//! A minimal daemon for exercising the `daemon` crate from its tests.  It starts the way
//! `ovsp4rt serve` does, optionally copies its stdin to a file, then idles until killed.

use anyhow::{Context, Result};
use clap::Parser;
use daemon::{Cleanup, Daemonize};
use std::fs::File;
use std::io::{self, prelude::*};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use tracing::{event, Level};

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Args {
    #[clap(flatten)]
    daemonize: Daemonize,

    /// File to write a greeting message to upon startup.
    #[clap(long)]
    greeting_file: Option<PathBuf>,

    /// Keep stdin open across detaching and copy it to this file.
    #[clap(long)]
    echo_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let Args { daemonize, greeting_file, echo_file } = Args::parse();
    let (daemonizing, mut cleanup) = unsafe { daemonize.start() }.map_err(|e| {
        event!(Level::ERROR, "{:#}", e);
        e
    })?;

    let greeting = format!("test-daemon: running as pid {}", std::process::id());
    if let Some(ref filename) = greeting_file {
        write_greeting(&mut cleanup, filename, &greeting)?;
    }
    let exempt: &[i32] = if echo_file.is_some() { &[0] } else { &[] };
    daemonizing.complete(exempt)?;

    if let Some(ref filename) = echo_file {
        cleanup.register_remove_file(filename)?;
        let mut output = File::create(filename)
            .with_context(|| format!("could not create {}", filename.display()))?;
        for line in io::stdin().lock().lines() {
            writeln!(output, "{}", line?)?;
        }
    }
    loop {
        sleep(Duration::from_secs(1));
    }
}

fn write_greeting(cleanup: &mut Cleanup, filename: &PathBuf, greeting: &str) -> Result<()> {
    cleanup.register_remove_file(filename)?;
    std::fs::write(filename, greeting.as_bytes())
        .with_context(|| format!("could not write {}", filename.display()))
}
