// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ClamAV scanner client.
//!
//! Talks the clamd TCP protocol directly: `SCAN` for paths the daemon can
//! read itself, `INSTREAM` when the staged file is only readable by this
//! process. Every socket call is timeout-bound so a hung daemon cannot
//! block pause-detection.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{JobError, Result};

/// INSTREAM chunk size; clamd's default stream limit is far above this.
const STREAM_CHUNK: usize = 64 * 1024;

/// Outcome of scanning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No threat detected.
    Passed,
    /// A threat signature matched.
    Found {
        /// Signature name reported by the scanner ("Eicar-Test-Signature").
        signature: String,
    },
    /// The scanner reported an error for this file (unreadable, oversize).
    Error {
        /// Scanner-reported detail.
        detail: String,
    },
    /// The scanner replied with something this client cannot classify.
    Unidentified,
}

/// Virus scanning behind a trait so jobs can run against a stub.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan by path, for daemons sharing a filesystem with this process.
    async fn scan_path(&self, path: &Path) -> Result<ScanOutcome>;

    /// Scan by streaming file content over the scanner transport.
    async fn scan_stream(&self, path: &Path) -> Result<ScanOutcome>;
}

/// clamd TCP client.
#[derive(Debug, Clone)]
pub struct ClamdScanner {
    addr: String,
    timeout: Duration,
}

impl ClamdScanner {
    /// Create a client for the daemon at `addr` (`host:port`), bounding each
    /// scan by `timeout`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                JobError::repository("virus scan", format!("connect to {} timed out", self.addr))
            })?
            .map_err(|e| {
                JobError::repository("virus scan", format!("connect to {}: {}", self.addr, e))
            })
    }

    async fn scan_path_inner(&self, path: &Path) -> Result<ScanOutcome> {
        let mut stream = self.connect().await?;
        let command = format!("SCAN {}\n", path.display());
        stream
            .write_all(command.as_bytes())
            .await
            .map_err(|e| JobError::repository("virus scan", e.to_string()))?;
        read_response(stream).await
    }

    async fn scan_stream_inner(&self, path: &Path) -> Result<ScanOutcome> {
        let mut stream = self.connect().await?;
        stream
            .write_all(b"zINSTREAM\0")
            .await
            .map_err(|e| JobError::repository("virus scan", e.to_string()))?;

        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            JobError::failed_simple(format!("cannot read staged file {}: {}", path.display(), e))
        })?;
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| JobError::failed_simple(format!("read {}: {}", path.display(), e)))?;
            if n == 0 {
                break;
            }
            // Each chunk is a 4-byte big-endian length followed by data.
            stream
                .write_all(&(n as u32).to_be_bytes())
                .await
                .map_err(|e| JobError::repository("virus scan", e.to_string()))?;
            stream
                .write_all(&buf[..n])
                .await
                .map_err(|e| JobError::repository("virus scan", e.to_string()))?;
        }
        // Zero-length chunk terminates the stream.
        stream
            .write_all(&0u32.to_be_bytes())
            .await
            .map_err(|e| JobError::repository("virus scan", e.to_string()))?;

        read_response(stream).await
    }
}

async fn read_response(stream: TcpStream) -> Result<ScanOutcome> {
    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader
        .read_to_string(&mut response)
        .await
        .map_err(|e| JobError::repository("virus scan", e.to_string()))?;
    debug!(response = %response.trim(), "scanner reply");
    Ok(classify_response(&response))
}

#[async_trait]
impl VirusScanner for ClamdScanner {
    async fn scan_path(&self, path: &Path) -> Result<ScanOutcome> {
        tokio::time::timeout(self.timeout, self.scan_path_inner(path))
            .await
            .map_err(|_| {
                JobError::failed_simple(format!("virus scan of {} timed out", path.display()))
            })?
    }

    async fn scan_stream(&self, path: &Path) -> Result<ScanOutcome> {
        tokio::time::timeout(self.timeout, self.scan_stream_inner(path))
            .await
            .map_err(|_| {
                JobError::failed_simple(format!("virus scan of {} timed out", path.display()))
            })?
    }
}

/// Classify a raw clamd reply line.
///
/// Replies look like `/path: OK`, `/path: Eicar-Test-Signature FOUND`, or
/// `/path: lstat() failed: No such file or directory. ERROR` (the `stream:`
/// prefix appears for INSTREAM scans).
pub fn classify_response(response: &str) -> ScanOutcome {
    let line = response.trim().trim_end_matches('\0').trim();
    if line.ends_with(" OK") || line == "OK" {
        return ScanOutcome::Passed;
    }
    if let Some(rest) = line.strip_suffix(" FOUND") {
        let signature = rest.rsplit(": ").next().unwrap_or(rest).to_string();
        return ScanOutcome::Found { signature };
    }
    if let Some(rest) = line.strip_suffix(" ERROR") {
        let detail = rest.split_once(": ").map(|(_, d)| d).unwrap_or(rest);
        return ScanOutcome::Error {
            detail: detail.to_string(),
        };
    }
    ScanOutcome::Unidentified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ok() {
        assert_eq!(
            classify_response("/staged/a.txt: OK\0"),
            ScanOutcome::Passed
        );
        assert_eq!(classify_response("stream: OK"), ScanOutcome::Passed);
    }

    #[test]
    fn test_classify_found() {
        assert_eq!(
            classify_response("/staged/evil.bin: Eicar-Test-Signature FOUND"),
            ScanOutcome::Found {
                signature: "Eicar-Test-Signature".to_string()
            }
        );
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_response(
                "/staged/gone.txt: lstat() failed: No such file or directory. ERROR"
            ),
            ScanOutcome::Error {
                detail: "lstat() failed: No such file or directory.".to_string()
            }
        );
    }

    #[test]
    fn test_classify_garbage() {
        assert_eq!(classify_response("???"), ScanOutcome::Unidentified);
        assert_eq!(classify_response(""), ScanOutcome::Unidentified);
    }
}
