use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::types::{AgentOptions, Message};
use crate::{ClaudeAgentError, Result};

// ─── QueryStream ──────────────────────────────────────────────────────────

/// Messages from one `claude` session.
///
/// A background task owns the subprocess and forwards messages over a
/// channel until the `result` message or EOF. A result with an error
/// subtype is forwarded and then followed by [`ClaudeAgentError::Session`].
/// Dropping the stream kills the subprocess.
pub struct QueryStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl QueryStream {
    pub(crate) fn new(prompt: String, opts: AgentOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut process = match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut finished = false;
            loop {
                match process.next_message().await {
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        finished = true;
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Message::Result(result))) => {
                        let failure = (!result.is_success()).then(|| ClaudeAgentError::Session {
                            subtype: result.subtype.clone(),
                            errors: result.errors.clone(),
                        });
                        if tx.send(Ok(Message::Result(result))).await.is_ok() {
                            if let Some(e) = failure {
                                let _ = tx.send(Err(e)).await;
                            }
                        }
                        finished = true;
                        break;
                    }
                    Ok(Some(msg)) => {
                        if tx.send(Ok(msg)).await.is_err() {
                            finished = true;
                            break;
                        }
                    }
                }
            }

            if !finished {
                if let Some(e) = process.exit_error().await {
                    let _ = tx.send(Err(e)).await;
                }
            }
            process.kill().await;
        });

        QueryStream { rx }
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
