//! Write-then-read consistency guard.
//!
//! # Design
//! Graph is eventually consistent: a `GET` issued right after a `POST` may
//! answer 404, and one issued right after a `PATCH` may still return the
//! old document with a 200. The guard therefore retries the post-write
//! read with capped exponential backoff until a caller-supplied predicate
//! accepts the observed value, and after an update it first waits out a
//! settle window before the first read.
//!
//! Retries stop at the attempt limit, at the caller's deadline, or on
//! cancellation, whichever comes first. A sleep that would end past the
//! deadline is not started. Exhaustion is reported as `PostWriteRead`,
//! which keeps the last error as its source and never masquerades as a
//! plain `NotFound`.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};

/// Which kind of write preceded the guarded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// Backoff schedule for a guarded read.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound for any single backoff delay.
    pub max_delay: Duration,
    /// Wait before the first read after an update. Ignored after a create.
    pub settle_window: Duration,
    /// Probe during the settle window and return as soon as the predicate
    /// accepts, instead of sleeping through it.
    pub exit_on_convergence: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> ReconcileResult<Self> {
        let policy = Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay: Duration::from_secs(10),
            settle_window: Duration::ZERO,
            exit_on_convergence: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Defaults used after a create: 8 attempts, 1s growing by 1.5x.
    pub fn for_create() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            settle_window: Duration::ZERO,
            exit_on_convergence: false,
        }
    }

    /// Defaults used after an update: a 7s settle window, then 5 attempts
    /// starting at 1s and doubling.
    pub fn for_update() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            settle_window: Duration::from_secs(7),
            exit_on_convergence: false,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_settle_window(mut self, settle_window: Duration) -> Self {
        self.settle_window = settle_window;
        self
    }

    pub fn with_exit_on_convergence(mut self, exit: bool) -> Self {
        self.exit_on_convergence = exit;
        self
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.max_attempts == 0 {
            return Err(ReconcileError::Config("max_attempts must be at least 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ReconcileError::Config(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(ReconcileError::Config(
                "max_delay must not be shorter than initial_delay".to_string(),
            ));
        }
        Ok(())
    }

    /// The delay after `current`, capped at `max_delay`. A product too large
    /// for `Duration` is already past the cap.
    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

/// Deadline and cancellation shared by every step of one operation.
#[derive(Debug, Clone)]
pub struct GuardContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for GuardContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardContext {
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too long to express as an `Instant` leaves the context
    /// without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive `fut` unless the deadline passes or the token fires first.
    pub async fn run<F: Future>(&self, fut: F, attempts: u32) -> ReconcileResult<F::Output> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled { attempts });
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled { attempts }),
            _ = until(self.deadline) => Err(ReconcileError::DeadlineExceeded { attempts }),
            output = fut => Ok(output),
        }
    }

    async fn pause(&self, delay: Duration, attempts: u32) -> ReconcileResult<()> {
        if let Some(deadline) = self.deadline {
            match Instant::now().checked_add(delay) {
                Some(wake) if wake <= deadline => {}
                _ => return Err(ReconcileError::DeadlineExceeded { attempts }),
            }
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled { attempts }),
            _ = sleep(delay) => Ok(()),
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read back a just-written object until `converged` accepts it.
///
/// `read` performs one `GET`; `converged` returns `Err(Stale)` (or any
/// other retryable error) when the observed value does not yet reflect the
/// write. Errors that are not retryable after a write are returned as-is.
pub async fn guarded_read<T, R, Fut, P>(
    resource: &str,
    policy: &RetryPolicy,
    write: WriteKind,
    ctx: &GuardContext,
    mut read: R,
    mut converged: P,
) -> ReconcileResult<T>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<T>>,
    P: FnMut(&T) -> ReconcileResult<()>,
{
    policy.validate()?;
    let mut delay = policy.initial_delay;

    if write == WriteKind::Update && !policy.settle_window.is_zero() {
        if policy.exit_on_convergence {
            if let Some(value) = probe_settle_window(policy, ctx, &mut read, &mut converged).await? {
                debug!(resource, "converged within settle window");
                return Ok(value);
            }
        } else {
            debug!(
                resource,
                settle_ms = policy.settle_window.as_millis() as u64,
                "waiting for update to propagate"
            );
            ctx.pause(policy.settle_window, 0).await?;
        }
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match ctx.run(read(), attempts).await? {
            Ok(value) => match converged(&value) {
                Ok(()) => {
                    debug!(resource, attempts, "read after write confirmed");
                    return Ok(value);
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        if !error.is_retryable_after_write() {
            return Err(error);
        }
        if attempts >= policy.max_attempts {
            warn!(resource, attempts, error = %error, "read after write never confirmed");
            return Err(ReconcileError::PostWriteRead {
                resource: resource.to_string(),
                attempts,
                source: Box::new(error),
            });
        }
        debug!(
            resource,
            attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "read after write not confirmed yet, retrying"
        );
        ctx.pause(delay, attempts).await?;
        delay = policy.next_delay(delay);
    }
}

async fn probe_settle_window<T, R, Fut, P>(
    policy: &RetryPolicy,
    ctx: &GuardContext,
    read: &mut R,
    converged: &mut P,
) -> ReconcileResult<Option<T>>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<T>>,
    P: FnMut(&T) -> ReconcileResult<()>,
{
    // `None` when the window reaches past what an `Instant` can hold.
    let settle_end = Instant::now().checked_add(policy.settle_window);
    let mut delay = policy.initial_delay;
    loop {
        match ctx.run(read(), 0).await? {
            Ok(value) if converged(&value).is_ok() => return Ok(Some(value)),
            Ok(_) => {}
            Err(e) if e.is_retryable_after_write() => {}
            Err(e) => return Err(e),
        }
        let step = match settle_end {
            Some(end) => {
                let now = Instant::now();
                if now >= end {
                    return Ok(None);
                }
                delay.min(end - now)
            }
            None => delay,
        };
        ctx.pause(step, 0).await?;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::cell::{Cell, RefCell};

    fn not_found() -> ReconcileError {
        TransportError {
            status: 404,
            code: "Request_ResourceNotFound".into(),
            message: "Resource does not exist".into(),
        }
        .into()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(100), 2.0)
            .unwrap()
            .with_max_delay(Duration::from_secs(1))
    }

    fn accept<T>(_: &T) -> ReconcileResult<()> {
        Ok(())
    }

    #[test]
    fn oversized_backoff_saturates_at_max_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 1e300)
            .unwrap()
            .with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(10));
        assert_eq!(policy.next_delay(Duration::MAX), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_leaves_no_deadline() {
        let ctx = GuardContext::new().with_timeout(Duration::from_secs(u64::MAX));
        assert!(ctx.deadline().is_none());

        let ctx = GuardContext::new().with_timeout(Duration::from_secs(5));
        let err = ctx.pause(Duration::MAX, 2).await.unwrap_err();
        assert!(matches!(err, ReconcileError::DeadlineExceeded { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_multiplier_still_exhausts_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 1e300)
            .unwrap()
            .with_max_delay(Duration::from_secs(1));
        let start = Instant::now();
        let err = guarded_read(
            "policy",
            &policy,
            WriteKind::Create,
            &GuardContext::new(),
            || async { Err::<(), _>(not_found()) },
            accept,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReconcileError::PostWriteRead { attempts: 3, .. }));
        assert_eq!(start.elapsed(), Duration::from_millis(1_100));
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_through_not_found() {
        let calls = Cell::new(0u32);
        let value = guarded_read(
            "policy",
            &fast_policy(8),
            WriteKind::Create,
            &GuardContext::new(),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 2 {
                        Err(not_found())
                    } else {
                        Ok("p1")
                    }
                }
            },
            accept,
        )
        .await
        .unwrap();
        assert_eq!(value, "p1");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_a_post_write_failure() {
        let calls = Cell::new(0u32);
        let err = guarded_read(
            "policy",
            &fast_policy(4),
            WriteKind::Create,
            &GuardContext::new(),
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(not_found()) }
            },
            accept,
        )
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 4);
        match err {
            ReconcileError::PostWriteRead { attempts, source, .. } => {
                assert_eq!(attempts, 4);
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let calls = Cell::new(0u32);
        let err = guarded_read(
            "policy",
            &fast_policy(4),
            WriteKind::Create,
            &GuardContext::new(),
            || {
                calls.set(calls.get() + 1);
                async {
                    Err::<(), _>(ReconcileError::from(TransportError {
                        status: 403,
                        code: "Authorization_RequestDenied".into(),
                        message: "Insufficient privileges".into(),
                    }))
                }
            },
            accept,
        )
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, ReconcileError::Transport(e) if e.status == 403));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_and_is_capped() {
        let seen = RefCell::new(Vec::new());
        let start = Instant::now();
        let policy = RetryPolicy::new(5, Duration::from_millis(400), 2.0)
            .unwrap()
            .with_max_delay(Duration::from_secs(1));
        let _ = guarded_read(
            "policy",
            &policy,
            WriteKind::Create,
            &GuardContext::new(),
            || {
                seen.borrow_mut().push(start.elapsed());
                async { Err::<(), _>(not_found()) }
            },
            accept,
        )
        .await;
        let ms: Vec<u128> = seen.borrow().iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![0, 400, 1200, 2200, 3200]);
    }

    #[tokio::test(start_paused = true)]
    async fn update_waits_for_settle_window_before_first_read() {
        let first_read = Cell::new(None);
        let start = Instant::now();
        let policy = fast_policy(3).with_settle_window(Duration::from_secs(7));
        guarded_read(
            "policy",
            &policy,
            WriteKind::Update,
            &GuardContext::new(),
            || {
                if first_read.get().is_none() {
                    first_read.set(Some(start.elapsed()));
                }
                async { Ok(()) }
            },
            accept,
        )
        .await
        .unwrap();
        assert!(first_read.get().unwrap() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_content_is_retried_until_the_predicate_accepts() {
        let calls = Cell::new(0u32);
        let value = guarded_read(
            "policy",
            &fast_policy(5).with_settle_window(Duration::from_secs(1)),
            WriteKind::Update,
            &GuardContext::new(),
            || {
                calls.set(calls.get() + 1);
                let state = if calls.get() < 3 { "enabled" } else { "disabled" };
                async move { Ok(state) }
            },
            |observed: &&str| {
                if *observed == "disabled" {
                    Ok(())
                } else {
                    Err(ReconcileError::Stale {
                        fields: vec!["state".into()],
                    })
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, "disabled");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_on_convergence_skips_the_rest_of_the_settle_window() {
        let start = Instant::now();
        let policy = fast_policy(3)
            .with_settle_window(Duration::from_secs(7))
            .with_exit_on_convergence(true);
        guarded_read(
            "policy",
            &policy,
            WriteKind::Update,
            &GuardContext::new(),
            || async { Ok(()) },
            accept,
        )
        .await
        .unwrap();
        assert!(start.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn create_ignores_settle_window() {
        let start = Instant::now();
        guarded_read(
            "policy",
            &fast_policy(3).with_settle_window(Duration::from_secs(7)),
            WriteKind::Create,
            &GuardContext::new(),
            || async { Ok(()) },
            accept,
        )
        .await
        .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_retries_before_exhaustion() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 2.0).unwrap();
        let ctx = GuardContext::new().with_timeout(Duration::from_secs(3));
        let err = guarded_read(
            "policy",
            &policy,
            WriteKind::Create,
            &ctx,
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(not_found()) }
            },
            accept,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReconcileError::DeadlineExceeded { attempts: 3 }));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_window_longer_than_deadline_aborts() {
        let ctx = GuardContext::new().with_timeout(Duration::from_secs(2));
        let err = guarded_read(
            "policy",
            &RetryPolicy::for_update(),
            WriteKind::Update,
            &ctx,
            || async { Ok(()) },
            accept,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReconcileError::DeadlineExceeded { attempts: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let ctx = GuardContext::new().with_cancellation(token.clone());
        let calls = Cell::new(0u32);
        let err = guarded_read(
            "policy",
            &fast_policy(10),
            WriteKind::Create,
            &ctx,
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 2 {
                    token.cancel();
                }
                async { Err::<(), _>(not_found()) }
            },
            accept,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled { attempts: 2 }));
    }

    #[test]
    fn policy_validation_rejects_nonsense() {
        assert!(RetryPolicy::new(0, Duration::from_secs(1), 2.0).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(1), 0.5).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(1), f64::NAN).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(20), 2.0).is_err());
        assert!(RetryPolicy::for_create().validate().is_ok());
        assert!(RetryPolicy::for_update().validate().is_ok());
    }
}
