//! Interactive reviewer
//!
//! Prompts on one stream and reads the decision from another, one PO at a
//! time. Concurrent POs of the same stop queue up behind the lock, so
//! prompts never interleave.

use async_trait::async_trait;
use hubflow_shipment::{ReviewError, ReviewRequest, Reviewer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

struct Console<R, W> {
    lines: Lines<BufReader<R>>,
    prompt: W,
}

/// [`Reviewer`] backed by a line-oriented console
pub struct ConsoleReviewer<R, W> {
    console: Mutex<Console<R, W>>,
}

impl ConsoleReviewer<tokio::io::Stdin, tokio::io::Stderr> {
    /// Read answers from stdin; prompt on stderr so stdout stays machine-readable
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stderr())
    }
}

impl<R, W> ConsoleReviewer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, prompt: W) -> Self {
        Self {
            console: Mutex::new(Console {
                lines: BufReader::new(input).lines(),
                prompt,
            }),
        }
    }
}

fn prompt_text(request: &ReviewRequest) -> String {
    format!(
        "\nEscalated PO {} (review attempt {})\n  Reason: {}\nEnter your decision: ",
        request.po_num,
        request.attempt,
        request.escalation_reason.as_deref().unwrap_or("none given"),
    )
}

#[async_trait]
impl<R, W> Reviewer for ConsoleReviewer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        let mut console = self.console.lock().await;

        let unavailable = |e: std::io::Error| ReviewError::Unavailable(e.to_string());
        console
            .prompt
            .write_all(prompt_text(request).as_bytes())
            .await
            .map_err(unavailable)?;
        console.prompt.flush().await.map_err(unavailable)?;

        match console.lines.next_line().await.map_err(unavailable)? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(ReviewError::Unavailable("input closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubflow_shipment::PoState;

    fn request(po_num: &str) -> ReviewRequest {
        ReviewRequest {
            po_num: po_num.to_string(),
            po_state: PoState::Escalated,
            escalation_reason: Some("Carrier missed window".to_string()),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_reads_one_line_per_review() {
        let input: &[u8] = b"  reject \nlooks good\n";
        let reviewer = ConsoleReviewer::new(input, Vec::new());

        assert_eq!(reviewer.review(&request("PO-1")).await.unwrap(), "reject");
        assert_eq!(reviewer.review(&request("PO-1")).await.unwrap(), "looks good");

        let console = reviewer.console.lock().await;
        let prompt = String::from_utf8_lossy(&console.prompt);
        assert_eq!(prompt.matches("Escalated PO PO-1").count(), 2);
        assert!(prompt.contains("Carrier missed window"));
    }

    #[tokio::test]
    async fn test_closed_input_is_unavailable() {
        let input: &[u8] = b"";
        let reviewer = ConsoleReviewer::new(input, tokio::io::sink());

        assert!(matches!(
            reviewer.review(&request("PO-2")).await,
            Err(ReviewError::Unavailable(_))
        ));
    }
}
