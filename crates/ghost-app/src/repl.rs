//! The line-oriented query loop.
//!
//! One line in, one `Ghost: ...` line out. Input is read as raw bytes and
//! decoded lossily, so a stray non-UTF-8 byte costs one odd-looking query
//! rather than the whole session. An empty line or end of input stops it.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use ghost_chat::GhostSession;
use ghost_core::error::Result;

/// Answer queries from `reader` until an empty line or EOF.
///
/// Returns the number of turns handled. Only I/O errors on the reader or
/// writer end the loop early; per-turn failures are part of the output.
pub async fn run_loop<R, W>(session: &GhostSession, mut reader: R, writer: &mut W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut turns = 0;

    loop {
        writer.write_all(b"You: ").await?;
        writer.flush().await?;

        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let query = line.trim();
        if query.is_empty() {
            break;
        }

        let outcome = session.handle_turn(query).await;
        writer.write_all(format!("{}\n", outcome).as_bytes()).await?;
        turns += 1;
    }

    writer.flush().await?;
    Ok(turns)
}
