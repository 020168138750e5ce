use anyhow::{anyhow, Result};
use inquire::{Confirm, Password, PasswordDisplayMode, Text};
use std::io::BufRead;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;

/// Terminal input.
///
/// Interactive prompts go through `inquire` on a blocking task. Raw lines for
/// loops that race other events come from a reader thread that only touches
/// stdin while a line has been requested, so the two never read at once.
pub struct Console {
    requests: std_mpsc::Sender<()>,
    lines: mpsc::UnboundedReceiver<Option<String>>,
    outstanding: bool,
}

impl Console {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(mut reader: R) -> Self {
        let (request_tx, request_rx) = std_mpsc::channel::<()>();
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            while request_rx.recv().is_ok() {
                let mut line = String::new();
                let line = match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
                };
                let closed = line.is_none();
                if tx.send(line).is_err() || closed {
                    break;
                }
            }
        });
        Self {
            requests: request_tx,
            lines: rx,
            outstanding: false,
        }
    }

    /// Next raw line; `None` once input is closed. Cancel-safe: a line
    /// requested by a dropped call is delivered to the next one.
    pub async fn next_line(&mut self) -> Option<String> {
        if !self.outstanding {
            self.requests.send(()).ok()?;
            self.outstanding = true;
        }
        let line = self.lines.recv().await.flatten();
        self.outstanding = false;
        line
    }

    /// Waits out a line read that is still pending so stdin is free for a
    /// prompt.
    pub async fn settle(&mut self) {
        if self.outstanding {
            println!("Press Enter to continue.");
            let _ = self.next_line().await;
        }
    }

    pub async fn text(&mut self, label: &str) -> Result<String> {
        self.settle().await;
        let label = format!("{label}:");
        let value = prompt_blocking(move || Text::new(&label).prompt()).await?;
        Ok(value.trim().to_string())
    }

    pub async fn text_required(&mut self, label: &str) -> Result<String> {
        self.settle().await;
        let message = format!("{label}:");
        let required = format!("{label} is required");
        let value = prompt_blocking(move || {
            Text::new(&message)
                .with_validator(inquire::required!(required))
                .prompt()
        })
        .await?;
        Ok(value.trim().to_string())
    }

    pub async fn password(&mut self, label: &str) -> Result<String> {
        self.settle().await;
        let label = format!("{label}:");
        prompt_blocking(move || {
            Password::new(&label)
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .prompt()
        })
        .await
    }

    /// Masked entry followed by a confirmation entry that must match.
    pub async fn new_password(&mut self) -> Result<String> {
        self.settle().await;
        prompt_blocking(|| {
            Password::new("Password:")
                .with_display_mode(PasswordDisplayMode::Masked)
                .with_validator(inquire::required!("Password is required"))
                .with_custom_confirmation_message("Confirm password:")
                .with_custom_confirmation_error_message("Passwords do not match")
                .prompt()
        })
        .await
    }

    pub async fn confirm(&mut self, label: &str, default: bool) -> Result<bool> {
        self.settle().await;
        let label = label.to_string();
        prompt_blocking(move || Confirm::new(&label).with_default(default).prompt()).await
    }
}

async fn prompt_blocking<T, F>(prompt: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> inquire::error::InquireResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(prompt)
        .await?
        .map_err(|e| anyhow!("Input cancelled: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn lines_are_read_on_demand() {
        let mut console = Console::from_reader(Cursor::new("reset\r\nhttp://localhost/cb?code=c&state=s\n"));
        assert_eq!(console.next_line().await.as_deref(), Some("reset"));

        // Nothing is pending, so settling must not swallow the next line.
        console.settle().await;
        assert_eq!(
            console.next_line().await.as_deref(),
            Some("http://localhost/cb?code=c&state=s")
        );
        assert_eq!(console.next_line().await, None);
        assert_eq!(console.next_line().await, None);
    }

    #[tokio::test]
    async fn a_dropped_read_is_delivered_to_the_next_call() {
        let mut console = Console::from_reader(Cursor::new("first\nsecond\n"));
        let early = {
            let read = console.next_line();
            tokio::pin!(read);
            poll_once(read.as_mut()).await
        };
        let first = match early {
            Some(line) => line,
            None => console.next_line().await,
        };
        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(console.next_line().await.as_deref(), Some("second"));
    }

    async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = std::future::ready(()) => None,
        }
    }
}
