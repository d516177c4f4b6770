//! Fan-out / fan-in primitives.
//!
//! A work unit reports through a [`ChannelPair`]: one receiver for values and
//! one for errors. [`spawn_unit`] runs a future as a unit that emits exactly
//! one of the two before closing both. [`merge`] and [`merge_pairs`] combine
//! many receivers into one, [`drain`] collects a pair into a final outcome
//! and [`relay`] forwards a pair into a parent unit's output.
//!
//! [`drain`] and [`relay`] share one policy: the first error wins. Values
//! already received are kept, everything still in flight is abandoned.
//!
//! All channels are unbounded so a producer whose consumer went away never
//! blocks; its sends simply fail and are ignored.

use crate::error::{ImgqError, Result};
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};


/// Receiving half of a work unit's output.
#[derive(Debug)]
pub struct ChannelPair<T> {
    pub results: UnboundedReceiver<T>,
    pub errors: UnboundedReceiver<ImgqError>,
}

/// Sending half of a work unit's output.
///
/// Dropping the emitter closes both channels.
#[derive(Debug)]
pub struct Emitter<T> {
    results: UnboundedSender<T>,
    errors: UnboundedSender<ImgqError>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            results: self.results.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Creates a connected emitter / receiver pair.
pub fn channel_pair<T>() -> (Emitter<T>, ChannelPair<T>) {
    let (results_tx, results) = mpsc::unbounded_channel();
    let (errors_tx, errors) = mpsc::unbounded_channel();
    (
        Emitter {
            results: results_tx,
            errors: errors_tx,
        },
        ChannelPair { results, errors },
    )
}

impl<T> Emitter<T> {
    /// Sends a value. A closed receiver is not an error.
    pub fn send(&self, value: T) {
        if self.results.send(value).is_err() {
            trace!("Result receiver dropped, discarding value");
        }
    }

    /// Sends an error. A closed receiver is not an error.
    pub fn fail(&self, error: ImgqError) {
        if let Err(mpsc::error::SendError(error)) = self.errors.send(error) {
            trace!(%error, "Error receiver dropped, discarding error");
        }
    }

    /// Emits a single outcome and closes both channels.
    pub fn emit(self, outcome: Result<T>) {
        match outcome {
            Ok(value) => self.send(value),
            Err(error) => self.fail(error),
        }
    }
}

/// Spawns `work` as a work unit.
///
/// The unit emits exactly one value or one error and then closes its pair.
/// If `token` is cancelled first the unit emits [`ImgqError::Cancelled`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_unit<T, F>(token: &CancellationToken, work: F) -> ChannelPair<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let (emitter, pair) = channel_pair();
    let token = token.clone();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ImgqError::Cancelled),
            outcome = work => outcome,
        };
        emitter.emit(outcome);
    });

    pair
}

/// Merges many receivers into one.
///
/// One relay task per input forwards every value until that input closes.
/// The output closes only after every input has closed. Values from the same
/// input keep their order; values from different inputs interleave.
pub fn merge<T: Send + 'static>(inputs: Vec<UnboundedReceiver<T>>) -> UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();

    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(value) = input.recv().await {
                if tx.send(value).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Merges the value and error sides of many pairs independently.
pub fn merge_pairs<T: Send + 'static>(pairs: Vec<ChannelPair<T>>) -> ChannelPair<T> {
    let (results, errors): (Vec<_>, Vec<_>) = pairs
        .into_iter()
        .map(|pair| (pair.results, pair.errors))
        .unzip();

    ChannelPair {
        results: merge(results),
        errors: merge(errors),
    }
}

/// Collects a pair into `(values, first_error)`.
///
/// Returns as soon as an error arrives, with whatever values were collected
/// until then. When the error side closes without producing anything, the
/// remaining values are read to completion and no error is returned. When
/// the value side closes first, the error side is still awaited so a late
/// error is never lost.
pub async fn drain<T>(pair: ChannelPair<T>) -> (Vec<T>, Option<ImgqError>) {
    let mut collected = Vec::new();
    let error = pump(pair, |value| collected.push(value)).await;

    if let Some(error) = &error {
        debug!(collected = collected.len(), %error, "Drain stopped at first error");
    }

    (collected, error)
}

/// Forwards a child pair into a parent emitter with the same first-error-wins
/// policy as [`drain`].
pub async fn relay<T>(parent: &Emitter<T>, child: ChannelPair<T>) {
    if let Some(error) = pump(child, |value| parent.send(value)).await {
        parent.fail(error);
    }
}

async fn pump<T>(pair: ChannelPair<T>, mut on_value: impl FnMut(T)) -> Option<ImgqError> {
    let ChannelPair {
        mut results,
        mut errors,
    } = pair;
    let mut results_open = true;

    loop {
        tokio::select! {
            biased;
            error = errors.recv() => match error {
                Some(error) => return Some(error),
                None => {
                    if results_open {
                        while let Some(value) = results.recv().await {
                            on_value(value);
                        }
                    }
                    return None;
                }
            },
            value = results.recv(), if results_open => match value {
                Some(value) => on_value(value),
                None => results_open = false,
            },
        }
    }
}
