//! Scripted resolver used by the engine's tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use optrack_core::{OperationId, RawStatus};

use crate::resolver::{ResolverError, StatusResolver};

/// Replays a fixed sequence of answers, then repeats a fallback forever.
pub(crate) struct ScriptedResolver {
    script: Mutex<VecDeque<Result<RawStatus, ResolverError>>>,
    fallback: Result<RawStatus, ResolverError>,
    delay: Duration,
    cancel_error: Option<ResolverError>,
    fetches: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedResolver {
    fn build(
        script: Vec<Result<RawStatus, ResolverError>>,
        fallback: Result<RawStatus, ResolverError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            cancel_error: None,
            fetches: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn always(raw: RawStatus) -> Arc<Self> {
        Arc::new(Self::build(Vec::new(), Ok(raw)))
    }

    pub fn failing(error: ResolverError) -> Arc<Self> {
        Arc::new(Self::build(Vec::new(), Err(error)))
    }

    pub fn sequence(
        script: Vec<Result<RawStatus, ResolverError>>,
        then: RawStatus,
    ) -> Arc<Self> {
        Arc::new(Self::build(script, Ok(then)))
    }

    /// Make every fetch take `delay` before answering.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("resolver already shared"));
        inner.delay = delay;
        Arc::new(inner)
    }

    /// Make remote cancellation fail.
    pub fn with_cancel_error(self: Arc<Self>, error: ResolverError) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("resolver already shared"));
        inner.cancel_error = Some(error);
        Arc::new(inner)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusResolver for ScriptedResolver {
    async fn fetch_status(&self, _id: &OperationId) -> Result<RawStatus, ResolverError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn cancel_remote(&self, _id: &OperationId) -> Result<(), ResolverError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        match &self.cancel_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
