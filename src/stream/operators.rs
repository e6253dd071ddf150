//! Stream operators as explicit timer-and-state machines.

use std::future::Future;
use std::time::Duration;

use futures::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

pub type BoxStream<T> = futures::stream::BoxStream<'static, T>;

// == Debounce ==
/// Emits a value only once `window` has passed without a newer one.
///
/// A value still pending when the input ends is flushed.
pub fn debounce<S, T>(input: S, window: Duration) -> BoxStream<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut input = Box::pin(input);
        let mut pending: Option<T> = None;
        let timer = sleep(window);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                next = input.next() => match next {
                    Some(value) => {
                        pending = Some(value);
                        timer.as_mut().reset(Instant::now() + window);
                    }
                    None => {
                        if let Some(value) = pending.take() {
                            let _ = tx.send(value);
                        }
                        break;
                    }
                },
                _ = &mut timer, if pending.is_some() => {
                    if let Some(value) = pending.take() {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                }
                _ = tx.closed() => break,
            }
        }
    });

    UnboundedReceiverStream::new(rx).boxed()
}

// == Throttle ==
/// Leading-edge rate gate: admits at most one event per window.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_emit: Option<Instant>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

/// Passes the first value of each `window` and drops the rest.
///
/// Arrival time is taken as values come in, not when the output is polled.
pub fn throttle<S, T>(input: S, window: Duration) -> BoxStream<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut input = Box::pin(input);
        let mut gate = Throttle::new(window);

        loop {
            tokio::select! {
                next = input.next() => match next {
                    Some(value) => {
                        if gate.admit(Instant::now()) && tx.send(value).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tx.closed() => break,
            }
        }
    });

    UnboundedReceiverStream::new(rx).boxed()
}

// == Distinct Until Changed ==
#[derive(Debug, Clone)]
pub struct DistinctUntilChanged<T> {
    last: Option<T>,
}

impl<T> Default for DistinctUntilChanged<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: PartialEq + Clone> DistinctUntilChanged<T> {
    /// True when `value` differs from the previously admitted one.
    pub fn admit(&mut self, value: &T) -> bool {
        if self.last.as_ref() == Some(value) {
            return false;
        }
        self.last = Some(value.clone());
        true
    }
}

/// Drops a value equal to the one emitted just before it.
pub fn distinct_until_changed<S, T>(input: S) -> BoxStream<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: PartialEq + Clone + Send + 'static,
{
    let mut gate = DistinctUntilChanged::default();
    input
        .filter(move |value| future::ready(gate.admit(value)))
        .boxed()
}

// == Switch Map ==
/// Runs `f` for every input; only the result of the latest input is emitted.
///
/// Superseded operations keep running but their results are discarded.
pub fn switch_map<S, T, R, F, Fut>(input: S, mut f: F) -> BoxStream<R>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut input = Box::pin(input);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, R)>();
        let mut generation: u64 = 0;
        let mut in_flight = false;
        let mut input_done = false;

        loop {
            tokio::select! {
                next = input.next(), if !input_done => match next {
                    Some(value) => {
                        generation += 1;
                        in_flight = true;
                        let operation = f(value);
                        let done = done_tx.clone();
                        let current = generation;
                        tokio::spawn(async move {
                            let _ = done.send((current, operation.await));
                        });
                    }
                    None => input_done = true,
                },
                Some((finished, result)) = done_rx.recv() => {
                    if finished == generation {
                        in_flight = false;
                        if tx.send(result).is_err() {
                            break;
                        }
                    } else {
                        debug!(finished, latest = generation, "discarding superseded result");
                    }
                }
                _ = tx.closed() => break,
            }

            if input_done && !in_flight {
                break;
            }
        }
    });

    UnboundedReceiverStream::new(rx).boxed()
}

// == Retry With Delay ==
/// Terminal value of a retryable operation; errors never escape as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Settled<R> {
    Value(R),
    Failed(String),
    TimedOut,
}

impl<R> Settled<R> {
    pub fn value(self) -> Option<R> {
        match self {
            Settled::Value(value) => Some(value),
            Settled::Failed(_) | Settled::TimedOut => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRetryPolicy {
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
    /// Per-attempt deadline
    pub timeout: Option<Duration>,
}

impl Default for StreamRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            timeout: None,
        }
    }
}

/// Runs `operation` up to `max_retries + 1` times with a fixed delay.
///
/// After exhaustion the last failure is returned as a sentinel instead of
/// an error.
pub async fn retry_with_delay<R, F, Fut>(mut operation: F, policy: &StreamRetryPolicy) -> Settled<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(Ok(value)) => return Settled::Value(value),
                Ok(Err(err)) => Settled::Failed(format!("{:#}", err)),
                Err(_) => Settled::TimedOut,
            },
            None => match operation().await {
                Ok(value) => return Settled::Value(value),
                Err(err) => Settled::Failed(format!("{:#}", err)),
            },
        };

        if attempt >= policy.max_retries {
            debug!(attempts = attempt + 1, "stream retries exhausted");
            return outcome;
        }
        attempt += 1;
        sleep(policy.delay).await;
    }
}

// == Scroll Threshold ==
/// One raw scroll sample from a list view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollEvent {
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ScrollEvent {
    /// Fraction of the content seen so far. Content that does not fill a
    /// positive height counts as fully seen.
    pub fn ratio(&self) -> f64 {
        if self.content_height <= 0.0 {
            return 1.0;
        }
        (self.scroll_y + self.viewport_height) / self.content_height
    }

    pub fn reached(&self, threshold: f64) -> bool {
        self.ratio() >= threshold
    }
}
