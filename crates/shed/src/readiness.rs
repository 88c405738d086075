//! Readiness signalling for sheds and wheels.
//!
//! Both are backed by a `tokio::sync::watch` channel: the initializing task publishes
//! each transition exactly once and waiters wake on change, instead of polling a flag.

use crate::error::ShedError;
use std::borrow::Cow;
use std::fmt;
use tokio::sync::watch;

/// Initialization progress of a shed. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    None = 0,
    BaseDirReady = 1,
    ObjectsDirReady = 2,
    CatalogConstructed = 3,
    Ready = 4,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::BaseDirReady => "base-dir-ready",
            Self::ObjectsDirReady => "objects-dir-ready",
            Self::CatalogConstructed => "catalog-constructed",
            Self::Ready => "ready",
        };
        write!(f, "{}/{name}", *self as u8)
    }
}

/// Lifecycle state published by a shed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Initializing(Stage),
    Ready,
    Failed(Cow<'static, str>),
    Closed,
}

impl Readiness {
    /// The stage reached so far. A closed shed reports `Ready` (it got there before
    /// closing); a failed one reports `None`.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Initializing(stage) => *stage,
            Self::Ready | Self::Closed => Stage::Ready,
            Self::Failed(_) => Stage::None,
        }
    }

    const fn is_settled(&self) -> bool {
        !matches!(self, Self::Initializing(_))
    }

    /// Fails fast unless the shed is in its terminal ready state.
    pub(crate) fn check(&self) -> Result<(), ShedError> {
        match self {
            Self::Ready => Ok(()),
            Self::Initializing(stage) => Err(ShedError::NotReady { stage: *stage }),
            Self::Failed(reason) => {
                Err(ShedError::InitFailed { message: reason.clone(), context: None })
            },
            Self::Closed => Err(ShedError::closed()),
        }
    }
}

/// Moves the published state forward; earlier stages never overwrite later ones.
pub(crate) fn advance(tx: &watch::Sender<Readiness>, stage: Stage) {
    tx.send_if_modified(|current| match current {
        Readiness::Initializing(reached) if *reached < stage => {
            *current =
                if stage == Stage::Ready { Readiness::Ready } else { Readiness::Initializing(stage) };
            true
        },
        _ => false,
    });
}

pub(crate) fn fail(tx: &watch::Sender<Readiness>, reason: impl Into<Cow<'static, str>>) {
    let reason = reason.into();
    tx.send_if_modified(|current| match current {
        Readiness::Initializing(_) => {
            *current = Readiness::Failed(reason);
            true
        },
        _ => false,
    });
}

/// Waits until the state settles, then maps it onto a result.
pub(crate) async fn wait(tx: &watch::Sender<Readiness>) -> Result<(), ShedError> {
    let mut rx = tx.subscribe();
    let settled = rx
        .wait_for(Readiness::is_settled)
        .await
        .map(|state| (*state).clone())
        .map_err(|_| ShedError::closed())?;
    settled.check()
}

/// Readiness of a single wheel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WheelReadiness {
    Pending,
    Ready,
    Failed(Cow<'static, str>),
}

pub(crate) async fn wait_wheel(
    tx: &watch::Sender<WheelReadiness>,
    id: &str,
) -> Result<(), ShedError> {
    let mut rx = tx.subscribe();
    let settled = rx
        .wait_for(|state| *state != WheelReadiness::Pending)
        .await
        .map(|state| (*state).clone())
        .map_err(|_| ShedError::closed())?;
    match settled {
        WheelReadiness::Ready => Ok(()),
        WheelReadiness::Failed(reason) => Err(ShedError::InitFailed {
            message: reason,
            context: Some(format!("wheel {id}").into()),
        }),
        WheelReadiness::Pending => unreachable!("wait_for only returns settled states"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_only_move_forward() {
        let (tx, rx) = watch::channel(Readiness::Initializing(Stage::None));

        advance(&tx, Stage::ObjectsDirReady);
        advance(&tx, Stage::BaseDirReady);
        assert_eq!(*rx.borrow(), Readiness::Initializing(Stage::ObjectsDirReady));

        advance(&tx, Stage::Ready);
        fail(&tx, "late failure");
        assert_eq!(*rx.borrow(), Readiness::Ready);
    }

    #[tokio::test]
    async fn wait_resolves_on_ready() {
        let (tx, _rx) = watch::channel(Readiness::Initializing(Stage::None));
        let waiter = wait(&tx);
        advance(&tx, Stage::Ready);
        assert!(waiter.await.is_ok());
    }

    #[tokio::test]
    async fn wait_rejects_on_failure() {
        let (tx, _rx) = watch::channel(Readiness::Initializing(Stage::BaseDirReady));
        fail(&tx, "objects directory unavailable");
        let err = wait(&tx).await.expect_err("failure must reject");
        assert!(matches!(err, ShedError::InitFailed { .. }), "unexpected error: {err:?}");
    }

    #[test]
    fn check_fails_fast_before_ready() {
        let err = Readiness::Initializing(Stage::CatalogConstructed).check().unwrap_err();
        assert!(matches!(err, ShedError::NotReady { stage: Stage::CatalogConstructed }));
        assert!(matches!(Readiness::Closed.check(), Err(ShedError::Closed { .. })));
    }
}
