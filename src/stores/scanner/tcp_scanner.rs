// docvault-core/src/stores/scanner/tcp_scanner.rs
// VirusScannerPort over a small length-prefixed-chunk TCP protocol: each
// body chunk is sent as a u32-BE length followed by that many bytes, a
// zero-length chunk marks end of stream, and the daemon replies with one
// line of `OK`, `FOUND: <threat-name>`, or `ERROR: <message>`. Health checks
// are a bare `PING` expecting a `PONG` line back. A fresh connection is
// opened per call; the daemon is expected to be cheap to dial (a local
// clamd-style process), not a long-lived session.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{CoreError, CoreResult};
use crate::ports::object_store::ByteStream;
use crate::ports::virus_scanner::{ScanOutcome, VirusScannerPort};

pub struct TcpVirusScanner {
    address: String,
    connect_timeout: std::time::Duration,
    scan_timeout: std::time::Duration,
}

impl TcpVirusScanner {
    pub fn new(address: impl Into<String>, connect_timeout: std::time::Duration, scan_timeout: std::time::Duration) -> Self {
        Self { address: address.into(), connect_timeout, scan_timeout }
    }

    async fn connect(&self) -> CoreResult<TcpStream> {
        timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| CoreError::dependency("virus_scanner", anyhow::anyhow!("connect to {} timed out", self.address)))?
            .map_err(|e| CoreError::dependency("virus_scanner", e))
    }
}

#[async_trait]
impl VirusScannerPort for TcpVirusScanner {
    async fn scan(&self, mut stream: ByteStream) -> CoreResult<ScanOutcome> {
        let conn = self.connect().await?;
        let (read_half, mut write_half) = conn.into_split();
        let mut reader = BufReader::new(read_half);

        let send_and_receive = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| CoreError::dependency("virus_scanner", e))?;
                write_half.write_u32(chunk.len() as u32).await?;
                write_half.write_all(&chunk).await?;
            }
            write_half.write_u32(0).await?;
            write_half.flush().await?;

            let mut line = String::new();
            reader.read_line(&mut line).await?;
            Ok::<String, std::io::Error>(line)
        };

        let line = timeout(self.scan_timeout, send_and_receive)
            .await
            .map_err(|_| CoreError::dependency("virus_scanner", anyhow::anyhow!("scan timed out")))?
            .map_err(|e| CoreError::dependency("virus_scanner", e))?;

        let line = line.trim();
        if line == "OK" {
            Ok(ScanOutcome::Clean)
        } else if let Some(threat_name) = line.strip_prefix("FOUND: ") {
            Ok(ScanOutcome::Infected { threat_name: threat_name.to_string() })
        } else if let Some(message) = line.strip_prefix("ERROR: ") {
            Ok(ScanOutcome::Error { message: message.to_string() })
        } else {
            Ok(ScanOutcome::Error { message: format!("unrecognized scanner response: {line}") })
        }
    }

    async fn health_check(&self) -> CoreResult<bool> {
        let conn = self.connect().await?;
        let (read_half, mut write_half) = conn.into_split();
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"PING\n").await.map_err(|e| CoreError::dependency("virus_scanner", e))?;
        write_half.flush().await.map_err(|e| CoreError::dependency("virus_scanner", e))?;

        let mut line = String::new();
        timeout(self.connect_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| CoreError::dependency("virus_scanner", anyhow::anyhow!("health check timed out")))?
            .map_err(|e| CoreError::dependency("virus_scanner", e))?;

        Ok(line.trim() == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn body(bytes: &'static [u8]) -> ByteStream {
        Box::pin(stream::once(async move { Ok(Bytes::from_static(bytes)) }))
    }

    /// Drains the length-prefixed-chunk request and writes back a single
    /// canned response line, mimicking the wire protocol's daemon side.
    async fn serve_one_reply(listener: TcpListener, reply: &'static str) {
        let (mut socket, _) = listener.accept().await.unwrap();
        loop {
            let len = socket.read_u32().await.unwrap();
            if len == 0 {
                break;
            }
            let mut buf = vec![0u8; len as usize];
            socket.read_exact(&mut buf).await.unwrap();
        }
        socket.write_all(reply.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn parses_colon_delimited_found_response_as_infected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_one_reply(listener, "FOUND: Eicar-Test-File\n"));

        let scanner = TcpVirusScanner::new(addr.to_string(), std::time::Duration::from_secs(2), std::time::Duration::from_secs(2));
        let outcome = scanner.scan(body(b"hello")).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Infected { threat_name: "Eicar-Test-File".to_string() });
    }

    #[tokio::test]
    async fn parses_colon_delimited_error_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_one_reply(listener, "ERROR: daemon overloaded\n"));

        let scanner = TcpVirusScanner::new(addr.to_string(), std::time::Duration::from_secs(2), std::time::Duration::from_secs(2));
        let outcome = scanner.scan(body(b"hello")).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Error { message: "daemon overloaded".to_string() });
    }

    #[tokio::test]
    async fn parses_ok_response_as_clean() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_one_reply(listener, "OK\n"));

        let scanner = TcpVirusScanner::new(addr.to_string(), std::time::Duration::from_secs(2), std::time::Duration::from_secs(2));
        let outcome = scanner.scan(body(b"hello")).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Clean);
    }
}
