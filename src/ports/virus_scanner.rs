// docvault-core/src/ports/virus_scanner.rs
// C7 Virus Scanner Port: streams bytes to an external scanner, returns
// clean/infected(name)/error. The wire protocol (length-prefixed chunks,
// textual OK/FOUND/ERROR responses, PING/PONG health check) is
// implemented by stores::scanner::tcp_scanner.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::ports::object_store::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Infected { threat_name: String },
    Error { message: String },
}

#[async_trait]
pub trait VirusScannerPort: Send + Sync {
    async fn scan(&self, stream: ByteStream) -> CoreResult<ScanOutcome>;

    /// Issues the PING/PONG health command; `Ok(true)` only on a literal PONG.
    async fn health_check(&self) -> CoreResult<bool>;
}
