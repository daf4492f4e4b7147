//! Wire format between the orchestrator and `worker` child processes.
//!
//! Everything travels as length-prefixed frames: a little-endian `u32` byte
//! count followed by the payload. A session looks like this:
//!
//! ```text
//! parent → child   frame: ScrubberConfig (JSON)
//! parent → child   frame: input image            ┐
//! child  → parent  status byte 0                 │ repeated
//!                  frame: ProcessingStats (JSON) │ per item
//!                  frame: output image           │
//!              or  status byte 1                 │
//!                  frame: ScrubError (JSON)      ┘
//! ```
//!
//! The parent ends the session by closing the child's stdin.

use std::io::{self, Read, Write};

use crate::error::{ScrubError, WorkerError};
use crate::pipeline::{Scrubber, ScrubberConfig};
use crate::types::ProcessingStats;

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 1 << 30;

const STATUS_OK: u8 = 0;
const STATUS_ERR: u8 = 1;

/// Write one frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), WorkerError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(WorkerError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, WorkerError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WorkerError::Protocol(format!("frame length {} exceeds limit", len)));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WorkerError::Protocol("stream ended inside a frame".into())
        } else {
            e.into()
        }
    })?;
    Ok(Some(payload))
}

fn require_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, WorkerError> {
    read_frame(reader)?.ok_or_else(|| WorkerError::Protocol("stream ended early".into()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, WorkerError> {
    serde_json::to_vec(value).map_err(|e| WorkerError::Protocol(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, WorkerError> {
    serde_json::from_slice(bytes).map_err(|e| WorkerError::Protocol(e.to_string()))
}

/// Send the session handshake.
pub fn write_handshake<W: Write>(writer: &mut W, config: &ScrubberConfig) -> Result<(), WorkerError> {
    write_frame(writer, &to_json(config)?)?;
    writer.flush()?;
    Ok(())
}

/// Send the outcome of scrubbing one item.
pub fn write_response<W: Write>(
    writer: &mut W,
    result: &Result<(Vec<u8>, ProcessingStats), ScrubError>,
) -> Result<(), WorkerError> {
    match result {
        Ok((output, stats)) => {
            writer.write_all(&[STATUS_OK])?;
            write_frame(writer, &to_json(stats)?)?;
            write_frame(writer, output)?;
        }
        Err(e) => {
            writer.write_all(&[STATUS_ERR])?;
            write_frame(writer, &to_json(e)?)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read the outcome of scrubbing one item.
///
/// A pipeline failure on the child side comes back as [`WorkerError::Scrub`].
pub fn read_response<R: Read>(reader: &mut R) -> Result<(Vec<u8>, ProcessingStats), WorkerError> {
    let mut status = [0u8; 1];
    reader.read_exact(&mut status)?;
    match status[0] {
        STATUS_OK => {
            let stats: ProcessingStats = from_json(&require_frame(reader)?)?;
            let output = require_frame(reader)?;
            Ok((output, stats))
        }
        STATUS_ERR => {
            let error: ScrubError = from_json(&require_frame(reader)?)?;
            Err(WorkerError::Scrub(error))
        }
        other => Err(WorkerError::Protocol(format!("unknown status byte {}", other))),
    }
}

/// Run the child side of a session until the parent closes `input`.
///
/// Returns the number of items handled.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<usize, WorkerError> {
    let config: ScrubberConfig = from_json(&require_frame(&mut input)?)?;
    tracing::debug!("Worker {} started", std::process::id());
    let scrubber = Scrubber::new(&config);

    let mut handled = 0;
    while let Some(item) = read_frame(&mut input)? {
        let result = scrubber.process(&item);
        if let Err(e) = &result {
            tracing::debug!("Worker item failed at {}: {}", e.stage(), e);
        }
        write_response(&mut output, &result)?;
        handled += 1;
    }

    tracing::debug!("Worker {} done after {} item(s)", std::process::id(), handled);
    Ok(handled)
}
