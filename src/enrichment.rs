//! The enrichment pipeline is an opaque external collaborator (§1, §6):
//! this module only models its contract — a bounded fire-and-forget sink
//! with a single `offer(id, content) -> bool` operation. What happens to an
//! offered item (entity extraction, embedding computation, summarization)
//! is out of scope.

use async_channel::{bounded, Receiver, Sender, TrySendError};

/// A single enrichment request: the memory id and its content at offer
/// time.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub memory_id: String,
    pub content: String,
}

/// Bounded fire-and-forget sink. `offer` never blocks the caller: when the
/// queue is full it returns `false` and the caller proceeds — the memory
/// simply stays `pending` until an external scheduler retries it (§5, §7).
pub struct EnrichmentQueue {
    sender: Sender<EnrichmentRequest>,
    receiver: Receiver<EnrichmentRequest>,
}

impl EnrichmentQueue {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Offer `(id, content)` to the queue. Returns `false` if full; callers
    /// MUST treat `false` as "will be recovered later" and proceed (§5).
    pub fn offer(&self, memory_id: String, content: String) -> bool {
        match self
            .sender
            .try_send(EnrichmentRequest { memory_id, content })
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Pull one pending request, if any. Exposed for the (out-of-scope)
    /// enrichment worker to drain from; the core never calls this itself.
    pub fn try_recv(&self) -> Option<EnrichmentRequest> {
        self.receiver.try_recv().ok()
    }
}

impl Clone for EnrichmentQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}
