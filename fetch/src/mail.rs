//! Raw mail and the sources that produce it.
//!
//! The spool source reads a JSON-lines file where every line is one
//! [`RawMail`]. Any unreadable line is treated as a transport failure, which
//! aborts the run. With `mark_read` the spool is moved aside for the run and
//! whatever the run did not consume is appended back to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc;

const MAIL_BUFFER: usize = 100;

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMail {
    #[serde(default)]
    pub from_name: String,
    pub from_address: String,
    #[serde(default)]
    pub subject: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl RawMail {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type MailResponse = Result<RawMail, MailError>;

#[async_trait]
pub trait MailSource: Send + Sync {
    /// Starts streaming unread messages. The channel closes once every
    /// message has been delivered.
    async fn unread(&self) -> Result<mpsc::Receiver<MailResponse>, MailError>;
}

pub struct SpoolMailSource {
    path: PathBuf,
    mark_read: bool,
}

impl SpoolMailSource {
    pub fn new(path: impl Into<PathBuf>, mark_read: bool) -> Self {
        SpoolMailSource {
            path: path.into(),
            mark_read,
        }
    }

    /// Moves the spool aside so mail delivered during the run lands in a
    /// fresh file.
    async fn claim(&self) -> Result<PathBuf, MailError> {
        if !self.mark_read {
            return Ok(self.path.clone());
        }
        let claimed = read_path(&self.path, Utc::now());
        tokio::fs::rename(&self.path, &claimed).await?;
        tracing::debug!(path = ?claimed, "claimed mail spool");
        Ok(claimed)
    }
}

fn read_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.read", now.format("%Y%m%dT%H%M%S%.f")));
    path.with_file_name(name)
}

#[async_trait]
impl MailSource for SpoolMailSource {
    async fn unread(&self) -> Result<mpsc::Receiver<MailResponse>, MailError> {
        let (tx, rx) = mpsc::channel(MAIL_BUFFER);

        if !tokio::fs::try_exists(&self.path).await? {
            tracing::debug!(path = ?self.path, "no mail spool found");
            return Ok(rx);
        }

        let path = self.claim().await?;
        let file = File::open(&path).await?;
        let requeue_to = self.mark_read.then(|| self.path.clone());

        tokio::spawn(stream_spool(file, tx, requeue_to));

        Ok(rx)
    }
}

/// Sends every message of a claimed spool. When the stream stops early, the
/// lines that were not delivered are appended to `requeue_to`.
async fn stream_spool(file: File, tx: mpsc::Sender<MailResponse>, requeue_to: Option<PathBuf>) {
    let mut lines = BufReader::new(file).lines();
    let mut line_number = 0;
    loop {
        line_number += 1;
        let line = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                let _ = tx.send(Err(MailError::Io(e))).await;
                return;
            }
        };

        let undelivered = match serde_json::from_str::<RawMail>(&line) {
            Ok(mail) => match tx.send(Ok(mail)).await {
                Ok(()) => continue,
                Err(_) => Some(line),
            },
            Err(source) => {
                let malformed = MailError::Malformed {
                    line: line_number,
                    source,
                };
                let _ = tx.send(Err(malformed)).await;
                None
            }
        };

        if let Some(spool) = requeue_to {
            match requeue(&spool, undelivered, lines).await {
                Ok(count) if count > 0 => {
                    tracing::info!(count, path = ?spool, "returned unread mail to spool")
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, path = ?spool, "unable to return unread mail to spool"),
            }
        }
        return;
    }
}

async fn requeue(
    spool: &Path,
    first: Option<String>,
    mut rest: Lines<BufReader<File>>,
) -> io::Result<usize> {
    let mut pending: Vec<String> = first.into_iter().collect();
    while let Some(line) = rest.next_line().await? {
        if !line.trim().is_empty() {
            pending.push(line);
        }
    }
    if pending.is_empty() {
        return Ok(0);
    }

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(spool)
        .await?;
    for line in &pending {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;
    Ok(pending.len())
}
