//! Single-flight render pipeline.
//!
//! Every submission gets a fresh [`RenderToken`] and flags the previous render as
//! cancelled. Completions travel over a channel and are only accepted when their
//! token is the latest one issued; anything older is dropped regardless of the
//! order in which the backend finished.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, RenderFailure};
use crate::{CancelFlag, DocumentBackend, RenderRequest, RenderToken, RenderedPage};

#[derive(Debug)]
pub struct RenderCompletion {
    pub token: RenderToken,
    pub request: RenderRequest,
    pub result: Result<RenderedPage, RenderFailure>,
}

/// Verdict of the token check.
#[derive(Debug)]
pub enum Accepted {
    Install {
        token: RenderToken,
        request: RenderRequest,
        page: RenderedPage,
    },
    Failed {
        token: RenderToken,
        request: RenderRequest,
        error: ProviderError,
    },
    Discarded,
}

pub struct RenderScheduler {
    backend: Arc<dyn DocumentBackend>,
    latest: RenderToken,
    resolved: RenderToken,
    in_flight: Option<CancelFlag>,
    outstanding: usize,
    sender: UnboundedSender<RenderCompletion>,
    receiver: UnboundedReceiver<RenderCompletion>,
}

impl RenderScheduler {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            backend,
            latest: RenderToken::default(),
            resolved: RenderToken::default(),
            in_flight: None,
            outstanding: 0,
            sender,
            receiver,
        }
    }

    /// Starts a render on the blocking pool. Must be called within a tokio runtime.
    #[instrument(skip(self), fields(token = tracing::field::Empty))]
    pub fn submit(&mut self, request: RenderRequest) -> RenderToken {
        self.latest = self.latest.next();
        let token = self.latest;
        tracing::Span::current().record("token", token.0);

        let cancel = CancelFlag::new();
        if let Some(previous) = self.in_flight.replace(cancel.clone()) {
            debug!("cancelling superseded render");
            previous.cancel();
        }

        self.outstanding += 1;
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let result = run_backend(backend.as_ref(), &request, &cancel);
            // The receiver lives as long as the scheduler; a send error only
            // means the viewer is gone.
            let _ = sender.send(RenderCompletion {
                token,
                request,
                result,
            });
        });
        token
    }

    /// Applies the token check to a finished render.
    pub fn accept(&mut self, completion: RenderCompletion) -> Accepted {
        let RenderCompletion {
            token,
            request,
            result,
        } = completion;

        if token != self.latest {
            debug!(token = token.0, latest = self.latest.0, "discarding stale render");
            return Accepted::Discarded;
        }

        self.resolved = token;
        self.in_flight = None;
        match result {
            Ok(page) => Accepted::Install {
                token,
                request,
                page,
            },
            Err(RenderFailure::Cancelled) => {
                debug!(token = token.0, "current render reported cancellation");
                Accepted::Discarded
            }
            Err(RenderFailure::Provider(error)) => {
                warn!(%error, page = request.page_index, "render failed");
                Accepted::Failed {
                    token,
                    request,
                    error,
                }
            }
        }
    }

    /// Next finished render, if one is already waiting.
    pub fn try_next(&mut self) -> Option<RenderCompletion> {
        let completion = self.receiver.try_recv().ok()?;
        self.outstanding = self.outstanding.saturating_sub(1);
        Some(completion)
    }

    /// Waits for the next finished render. Returns `None` once nothing is in flight.
    pub async fn next(&mut self) -> Option<RenderCompletion> {
        if self.outstanding == 0 {
            return None;
        }
        let completion = self.receiver.recv().await?;
        self.outstanding = self.outstanding.saturating_sub(1);
        Some(completion)
    }

    pub fn latest(&self) -> RenderToken {
        self.latest
    }

    /// True while the most recent submission has not come back yet.
    pub fn is_current_pending(&self) -> bool {
        self.resolved != self.latest
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

fn run_backend(
    backend: &dyn DocumentBackend,
    request: &RenderRequest,
    cancel: &CancelFlag,
) -> Result<RenderedPage, RenderFailure> {
    if cancel.is_cancelled() {
        return Err(RenderFailure::Cancelled);
    }
    match catch_unwind(AssertUnwindSafe(|| backend.render_page(request, cancel))) {
        Ok(result) => result,
        Err(payload) => Err(ProviderError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn request(page_index: usize, scale: f32) -> RenderRequest {
        RenderRequest {
            page_index,
            scale,
            ..RenderRequest::default()
        }
    }

    #[tokio::test]
    async fn completion_for_superseded_token_is_discarded() {
        let backend = Arc::new(FakeBackend::new(3, 20.0, 10.0));
        let mut scheduler = RenderScheduler::new(backend);

        let first = scheduler.submit(request(0, 1.0));
        let stale = scheduler.next().await.unwrap();
        assert_eq!(stale.token, first);

        let second = scheduler.submit(request(1, 1.0));
        assert!(matches!(scheduler.accept(stale), Accepted::Discarded));
        assert!(scheduler.is_current_pending());

        let fresh = scheduler.next().await.unwrap();
        match scheduler.accept(fresh) {
            Accepted::Install { token, request, .. } => {
                assert_eq!(token, second);
                assert_eq!(request.page_index, 1);
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert!(!scheduler.is_current_pending());
        assert!(scheduler.next().await.is_none());
    }

    #[tokio::test]
    async fn new_submission_flags_previous_render_as_cancelled() {
        let backend = Arc::new(FakeBackend::new(3, 20.0, 10.0));
        let mut scheduler = RenderScheduler::new(backend.clone());

        scheduler.submit(request(0, 1.0));
        let completion = scheduler.next().await.unwrap();
        scheduler.submit(request(0, 2.0));

        let seen = backend.seen_cancel_flags();
        assert!(seen[0].is_cancelled());
        drop(completion);
    }

    #[tokio::test]
    async fn tokens_increase_monotonically() {
        let backend = Arc::new(FakeBackend::new(3, 20.0, 10.0));
        let mut scheduler = RenderScheduler::new(backend);

        let a = scheduler.submit(request(0, 1.0));
        let b = scheduler.submit(request(0, 1.1));
        let c = scheduler.submit(request(0, 1.2));

        assert!(a < b && b < c);
        assert_eq!(scheduler.latest(), c);
        while scheduler.next().await.is_some() {}
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[tokio::test]
    async fn provider_error_is_reported_as_failure() {
        let backend = Arc::new(FakeBackend::new(3, 20.0, 10.0).failing_on(1));
        let mut scheduler = RenderScheduler::new(backend);

        scheduler.submit(request(1, 1.0));
        let completion = scheduler.next().await.unwrap();

        match scheduler.accept(completion) {
            Accepted::Failed { error, .. } => {
                assert!(matches!(error, ProviderError::Unsupported(_)))
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[tokio::test]
    async fn panicking_backend_is_contained() {
        let backend = Arc::new(FakeBackend::new(3, 20.0, 10.0).panicking_on(2));
        let mut scheduler = RenderScheduler::new(backend);

        scheduler.submit(request(2, 1.0));
        let completion = scheduler.next().await.unwrap();

        match scheduler.accept(completion) {
            Accepted::Failed { error, .. } => {
                assert_eq!(error, ProviderError::Panicked("rasterizer exploded".into()))
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }
}
