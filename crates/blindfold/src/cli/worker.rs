//! The hidden `blindfold worker` command run by process-based bulk scrubbing.
//!
//! Stdout carries the framed protocol, so everything else goes to the log.

use std::io::{BufReader, BufWriter};

/// Serve scrub requests on stdin/stdout until the parent closes stdin.
pub async fn execute() -> anyhow::Result<()> {
    tokio::task::spawn_blocking(|| {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        blindfold_core::bulk::serve(BufReader::new(stdin.lock()), BufWriter::new(stdout.lock()))
    })
    .await??;
    Ok(())
}
