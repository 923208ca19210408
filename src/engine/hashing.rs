// docvault-core/src/engine/hashing.rs
// Streaming SHA-256 + byte count, computed as the upload body passes through
// to the object store so Upload never buffers the whole file to hash it
// (spec section 4.4 step 3: "streaming-hashing to SHA-256").

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::ports::object_store::ByteStream;

#[derive(Debug, Clone, Default)]
pub struct HashResult {
    pub content_hash: String,
    pub byte_count: i64,
}

struct HashingState {
    hasher: Sha256,
    byte_count: i64,
}

/// Wraps a `ByteStream`, feeding every chunk into a `Sha256` hasher and byte
/// counter as it's polled. The final digest is only meaningful once the
/// wrapped stream has been driven to completion (`poll_next` returns `None`);
/// callers read it back out of the shared `HashResult` handle after the
/// consumer (object store `put_temporary`) finishes draining the stream.
pub struct HashingStream {
    inner: ByteStream,
    state: Arc<Mutex<HashingState>>,
    result: Arc<Mutex<Option<HashResult>>>,
}

impl HashingStream {
    pub fn wrap(inner: ByteStream) -> (Self, Arc<Mutex<Option<HashResult>>>) {
        let result = Arc::new(Mutex::new(None));
        let stream = Self {
            inner,
            state: Arc::new(Mutex::new(HashingState {
                hasher: Sha256::new(),
                byte_count: 0,
            })),
            result: result.clone(),
        };
        (stream, result)
    }
}

/// Boxes a `HashingStream` back into the opaque `ByteStream` alias so
/// callers (the document engine) can pass it straight to `put_temporary`
/// without naming the wrapper type.
pub fn hash_while_streaming(inner: ByteStream) -> (ByteStream, Arc<Mutex<Option<HashResult>>>) {
    let (stream, result) = HashingStream::wrap(inner);
    (Box::pin(stream), result)
}

impl Stream for HashingStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let mut state = this.state.lock();
                state.hasher.update(&chunk);
                state.byte_count += chunk.len() as i64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                let state = this.state.lock();
                let digest = state.hasher.clone().finalize();
                *this.result.lock() = Some(HashResult {
                    content_hash: hex::encode(digest),
                    byte_count: state.byte_count,
                });
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
