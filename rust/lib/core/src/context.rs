//! Per-call context: deadline, cancellation and the inbound tracing span.
//!
//! Every storage and cache operation takes a `&Context` and checks it
//! before blocking. A context that is cancelled or past its deadline makes
//! the operation abort with [`ContextError`].

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Span;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Caller-supplied call context.
///
/// Cheap to clone; clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    span: Option<Span>,
}

impl Context {
    /// A context with no deadline, no parent span, never cancelled
    /// unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that expires `timeout` from now. An earlier
    /// existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
            span: self.span.clone(),
        }
    }

    /// Derive a context sharing `token` for cancellation.
    pub fn with_cancel_token(&self, token: CancellationToken) -> Self {
        Self {
            deadline: self.deadline,
            cancel: token,
            span: self.span.clone(),
        }
    }

    /// Attach the inbound span; storage calls open child spans under it.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.clone(),
            span: Some(span),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Ok while the context is live.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.cancel.is_cancelled() {
            return Err(ContextError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ContextError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
