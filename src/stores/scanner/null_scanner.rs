// docvault-core/src/stores/scanner/null_scanner.rs
// A VirusScannerPort that never talks to a network daemon: always reports
// clean, except for the canonical EICAR test string, which it reports as
// infected. Lets a deployment without a real AV daemon still exercise the
// quarantine path, and lets property tests drive both outcomes
// deterministically.

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{CoreError, CoreResult};
use crate::ports::object_store::ByteStream;
use crate::ports::virus_scanner::{ScanOutcome, VirusScannerPort};

/// The canonical EICAR antivirus test string.
pub const EICAR_SIGNATURE: &str = r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

#[derive(Default)]
pub struct NullVirusScanner;

impl NullVirusScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VirusScannerPort for NullVirusScanner {
    async fn scan(&self, mut stream: ByteStream) -> CoreResult<ScanOutcome> {
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::dependency("virus_scanner", e))?;
            buf.extend_from_slice(&chunk);
        }
        if String::from_utf8_lossy(&buf).contains(EICAR_SIGNATURE) {
            Ok(ScanOutcome::Infected { threat_name: "EICAR-Test-File".to_string() })
        } else {
            Ok(ScanOutcome::Clean)
        }
    }

    async fn health_check(&self) -> CoreResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn body(bytes: Vec<u8>) -> ByteStream {
        Box::pin(stream::once(async move { Ok(Bytes::from(bytes)) }))
    }

    #[tokio::test]
    async fn eicar_signature_is_flagged_infected() {
        let scanner = NullVirusScanner::new();
        let outcome = scanner.scan(body(EICAR_SIGNATURE.as_bytes().to_vec())).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Infected { .. }));
    }

    #[tokio::test]
    async fn ordinary_content_is_clean() {
        let scanner = NullVirusScanner::new();
        let outcome = scanner.scan(body(b"hello world".to_vec())).await.unwrap();
        assert_eq!(outcome, ScanOutcome::Clean);
    }
}
