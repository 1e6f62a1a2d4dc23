//! Merged stdout/stderr capture
//!
//! Both pipes are pumped by their own task into one shared buffer, so the
//! captured text keeps the order in which chunks arrived.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 4096;

pub(crate) struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    /// Start pumping every given reader into a shared buffer
    pub(crate) fn spawn<R>(sources: impl IntoIterator<Item = R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let readers = sources
            .into_iter()
            .map(|source| tokio::spawn(pump(source, Arc::clone(&buffer))))
            .collect();
        Self { buffer, readers }
    }

    /// Wait up to `grace` for the pipes to close, then return what was captured
    ///
    /// A grandchild that inherited a pipe can keep it open after the direct
    /// child is gone; its readers are aborted once the grace period expires.
    pub(crate) async fn finish(mut self, grace: Duration) -> String {
        let all_closed = futures_util::future::join_all(self.readers.iter_mut());
        if tokio::time::timeout(grace, all_closed).await.is_err() {
            tracing::debug!("Output pipes still open after {:?}, keeping partial output", grace);
            for reader in &self.readers {
                reader.abort();
            }
        }

        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let output = String::from_utf8_lossy(&bytes).into_owned();
        output
    }
}

async fn pump<R>(mut source: R, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match source.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!("Stopped reading client output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_all_sources() {
        let capture = OutputCapture::spawn(vec![&b"hello "[..], &b"world"[..]]);
        let output = capture.finish(Duration::from_secs(1)).await;
        assert_eq!(output.len(), "hello world".len());
        assert!(output.contains("hello "));
        assert!(output.contains("world"));
    }

    #[tokio::test]
    async fn test_open_pipe_is_cut_after_grace() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let capture = OutputCapture::spawn(vec![reader]);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"partial")
            .await
            .unwrap();

        // writer stays open for the whole test
        let output = capture.finish(Duration::from_millis(100)).await;
        assert_eq!(output, "partial");
        drop(writer);
    }
}
