//! Line output shared by the server and the client.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spawn the single writer for a stream. Each line sent on the returned
/// channel is written with a trailing newline and flushed. The task ends
/// when every sender is dropped or a write fails.
pub(crate) fn spawn_line_writer<W>(
    mut writer: W,
) -> (mpsc::UnboundedSender<String>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let task = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                warn!(error = %e, "Failed to write line, stopping writer");
                break;
            }
        }
    });
    (tx, task)
}
