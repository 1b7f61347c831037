//! Connection Handler
//!
//! Each admitted connection goes through the same phases:
//! read one line, validate it, record it, respond, close. Every exit path
//! closes the stream and returns the admission slot.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tally_core::{validate_line, AdmissionPermit, ProtocolError, TallyState, LINE_LENGTH};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Upper bound on bytes read while looking for a line terminator
pub const MAX_READ_BYTES: u64 = 64 * 1024;

/// How a handled connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// A valid value was counted; `unique` is true on its first sighting
    Recorded { value: i64, unique: bool },
    /// The line failed validation and an error response was sent
    Rejected(ProtocolError),
    /// The peer went away before a line could be read
    PeerClosed,
    /// Nothing arrived within the configured read timeout
    TimedOut,
}

/// Serve one admitted connection to completion.
///
/// The permit is held for the whole exchange and released once the stream
/// is closed. Only internal faults are returned as errors.
pub async fn handle_connection<S>(
    stream: S,
    state: Arc<TallyState>,
    permit: AdmissionPermit,
    read_timeout: Option<Duration>,
) -> RuntimeResult<HandlerOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let outcome = serve(&mut stream, &state, read_timeout).await;

    // Cleanup runs on every path, including faults
    if let Err(e) = stream.shutdown().await {
        debug!("Error closing connection: {}", e);
    }
    permit.release();

    if let Ok(outcome) = &outcome {
        debug!("Connection finished: {:?}", outcome);
    }
    outcome
}

async fn serve<S>(
    stream: &mut BufReader<S>,
    state: &TallyState,
    read_timeout: Option<Duration>,
) -> RuntimeResult<HandlerOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = match read_line(stream, read_timeout).await? {
        LineRead::Line(line) => line,
        LineRead::PeerClosed => return Ok(HandlerOutcome::PeerClosed),
        LineRead::TimedOut => return Ok(HandlerOutcome::TimedOut),
    };

    let record = match validate_line(&line) {
        Ok(record) => record,
        Err(err) => {
            debug!("Rejected {} byte request: {}", line.len(), err);
            respond(stream, &err.to_response()).await;
            return Ok(HandlerOutcome::Rejected(err));
        }
    };

    state.record_valid(&record);
    respond(stream, &record.to_response()).await;

    let unique = state
        .record_unique(&record)
        .await
        .map_err(RuntimeError::RecordFault)?;

    Ok(HandlerOutcome::Recorded {
        value: record.value(),
        unique,
    })
}

enum LineRead {
    Line(Vec<u8>),
    PeerClosed,
    TimedOut,
}

/// Read up to and including the first `\n`, or to end-of-stream.
///
/// A peer reset is reported as `PeerClosed`; any other read failure is a
/// fault.
async fn read_line<S>(
    stream: &mut BufReader<S>,
    read_timeout: Option<Duration>,
) -> RuntimeResult<LineRead>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(LINE_LENGTH);
    let mut limited = stream.take(MAX_READ_BYTES);
    let read = limited.read_until(b'\n', &mut line);

    let result = match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => {
                debug!("No request within {:?}, closing", limit);
                return Ok(LineRead::TimedOut);
            }
        },
        None => read.await,
    };

    match result {
        Ok(_) => Ok(LineRead::Line(line)),
        Err(e) if is_peer_closed(&e) => {
            warn!("Peer closed connection mid-read: {}", e);
            Ok(LineRead::PeerClosed)
        }
        Err(e) => Err(RuntimeError::ReadFault(e)),
    }
}

fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Best-effort write; a client that left early is not an error
async fn respond<S>(stream: &mut BufReader<S>, response: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = match stream.write_all(response.as_bytes()).await {
        Ok(()) => stream.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        debug!("Error writing response: {}", e);
    }
}
