//! Safely coordinate use of things that can be [`Subject`]ed: a lock-file
//! based start/use/stop dance for any resource that can report whether it
//! exists, is running, and can be started/stopped/destroyed.
//!
//! [`run_and_stop`] acquires a shared lock (starting the resource first if
//! no one else has it running), runs an action, then releases back down to
//! stopped if this call was the only user left:
//!
//! ```ignore
//! let lock = lock::UnlockedFile::try_from(lock_path.as_path())?;
//! let result = coordinate::run_and_stop(&resource, options, lock, || resource.query())?;
//! ```

mod error;
pub mod guard;
pub mod resource;
mod retries;

#[cfg(test)]
mod tests;

use either::Either::{Left, Right};

use crate::lock;
pub use error::CoordinateError;

#[derive(Debug, PartialEq, Eq)]
pub enum State {
    /// The action we requested was performed from this process, e.g. we tried
    /// to create the cluster, and we did indeed create the cluster.
    Modified,
    /// The action we requested was performed by another process, or was not
    /// necessary, e.g. we tried to stop the cluster but it was already stopped.
    Unmodified,
}

/// The trait that these coordinate functions work with.
pub trait Subject {
    type Error: std::error::Error + Send + Sync;
    type Options<'a>;

    fn start(&self, options: Self::Options<'_>) -> Result<State, Self::Error>;
    fn stop(&self) -> Result<State, Self::Error>;
    fn destroy(&self) -> Result<State, Self::Error>;
    fn exists(&self) -> Result<bool, Self::Error>;
    fn running(&self) -> Result<bool, Self::Error>;
}

/// Perform `action` in `cluster`.
///
/// Using the given lock for synchronisation, this creates the cluster if it
/// does not exist, starts it if it's not running, performs the `action`, then
/// (maybe) stops the cluster again, and finally returns the result of `action`.
/// If there are other users of the cluster – i.e. if an exclusive lock cannot
/// be acquired during the shutdown phase – then the cluster is left running.
pub fn run_and_stop<S, F, T>(
    control: &S,
    options: S::Options<'_>,
    lock: lock::UnlockedFile,
    action: F,
) -> Result<T, CoordinateError<S::Error>>
where
    S: Subject,
    F: std::panic::UnwindSafe + FnOnce() -> T,
{
    let (lock, _) = startup(lock, control, options, retries::unbounded())?;
    let action_res = std::panic::catch_unwind(action);
    let shutdown_res = shutdown::<S, _, _>(lock, || control.stop());
    match action_res {
        Ok(result) => shutdown_res.map(|_| result),
        Err(err) => std::panic::resume_unwind(err),
    }
}

/// Perform `action` in `cluster` **if it exists**.
///
/// Using the given lock for synchronisation, this starts the cluster it if it's
/// not running, performs the `action`, then (maybe) stops the cluster again,
/// and finally returns the result of `action`. If there are other users of the
/// cluster – i.e. if an exclusive lock cannot be acquired during the shutdown
/// phase – then the cluster is left running.
pub fn run_and_stop_if_exists<S, F, T>(
    control: &S,
    options: S::Options<'_>,
    lock: lock::UnlockedFile,
    action: F,
) -> Result<T, CoordinateError<S::Error>>
where
    S: Subject,
    F: std::panic::UnwindSafe + FnOnce() -> T,
{
    let (lock, _) = startup_if_exists(lock, control, options, retries::unbounded())?;
    let action_res = std::panic::catch_unwind(action);
    let shutdown_res = shutdown::<S, _, _>(lock, || control.stop());
    match action_res {
        Ok(result) => shutdown_res.map(|_| result),
        Err(err) => std::panic::resume_unwind(err),
    }
}

/// Perform `action` in `cluster`, destroying the cluster before returning.
///
/// Similar to [`run_and_stop`] except this attempts to destroy the cluster
/// – i.e. stop the cluster and completely delete its data directory – before
/// returning. If there are other users of the cluster – i.e. if an exclusive
/// lock cannot be acquired during the shutdown phase – then the cluster is left
/// running and is **not** destroyed.
pub fn run_and_destroy<S, F, T>(
    control: &S,
    options: S::Options<'_>,
    lock: lock::UnlockedFile,
    action: F,
) -> Result<T, CoordinateError<S::Error>>
where
    S: Subject,
    F: std::panic::UnwindSafe + FnOnce() -> T,
{
    let (lock, _) = startup(lock, control, options, retries::unbounded())?;
    let action_res = std::panic::catch_unwind(action);
    let shutdown_res = shutdown::<S, _, _>(lock, || control.destroy());
    match action_res {
        Ok(result) => shutdown_res.map(|_| result),
        Err(err) => std::panic::resume_unwind(err),
    }
}

/// Start `control`, retrying according to `retries` while some other process
/// holds an exclusive lock on it. Returns a shared lock once `control` is
/// confirmed running, along with whether we were the one to start it.
fn startup<S: Subject>(
    mut lock: lock::UnlockedFile,
    control: &S,
    options: S::Options<'_>,
    mut retries: impl Iterator<Item = std::time::Duration>,
) -> Result<(lock::LockedFileShared, State), CoordinateError<S::Error>> {
    loop {
        lock = match lock.try_lock_exclusive() {
            Ok(Left(lock)) => {
                // The cluster is locked exclusively by someone/something else.
                // Switch to a shared lock optimistically. This blocks until we
                // get the shared lock.
                let lock = lock.lock_shared()?;
                // The cluster may have been started while that exclusive lock
                // was held, so we must check if the cluster is running now –
                // otherwise we loop back to the top again.
                if control.running().map_err(CoordinateError::ControlError)? {
                    return Ok((lock, State::Unmodified));
                }
                // Release all locks then wait according to `retries` before
                // trying again.
                let lock = lock.unlock()?;
                match retries.next() {
                    Some(delay) => {
                        std::thread::sleep(delay);
                        lock
                    }
                    None => return Err(CoordinateError::Timeout),
                }
            }
            Ok(Right(lock)) => {
                // We have an exclusive lock, so try to start the cluster.
                let state = control.start(options).map_err(CoordinateError::ControlError)?;
                // Once started, downgrade to a shared lock.
                return Ok((lock.lock_shared()?, state));
            }
            Err(err) => return Err(err.into()),
        };
    }
}

fn startup_if_exists<S: Subject>(
    mut lock: lock::UnlockedFile,
    control: &S,
    options: S::Options<'_>,
    mut retries: impl Iterator<Item = std::time::Duration>,
) -> Result<(lock::LockedFileShared, State), CoordinateError<S::Error>> {
    loop {
        lock = match lock.try_lock_exclusive() {
            Ok(Left(lock)) => {
                // The cluster is locked exclusively by someone/something else.
                // Switch to a shared lock optimistically. This blocks until we
                // get the shared lock.
                let lock = lock.lock_shared()?;
                // The cluster may have been started while that exclusive lock
                // was held, so we must check if the cluster is running now –
                // otherwise we loop back to the top again.
                if control.running().map_err(CoordinateError::ControlError)? {
                    return Ok((lock, State::Unmodified));
                }
                // Release all locks then wait according to `retries` before
                // trying again.
                let lock = lock.unlock()?;
                match retries.next() {
                    Some(delay) => {
                        std::thread::sleep(delay);
                        lock
                    }
                    None => return Err(CoordinateError::Timeout),
                }
            }
            Ok(Right(lock)) => {
                // We have an exclusive lock, so try to start the cluster.
                if control.exists().map_err(CoordinateError::ControlError)? {
                    let state = control.start(options).map_err(CoordinateError::ControlError)?;
                    // Once started, downgrade to a shared lock.
                    return Ok((lock.lock_shared()?, state));
                }
                return Err(CoordinateError::DoesNotExist);
            }
            Err(err) => return Err(err.into()),
        };
    }
}

fn shutdown<S, F, T>(
    lock: lock::LockedFileShared,
    action: F,
) -> Result<Option<T>, CoordinateError<S::Error>>
where
    S: Subject,
    F: FnOnce() -> Result<T, S::Error>,
{
    match lock.try_lock_exclusive() {
        Ok(Left(lock)) => {
            // The cluster is in use by someone/something else. There's nothing
            // more we can do here.
            lock.unlock()?;
            Ok(None)
        }
        Ok(Right(lock)) => {
            // We have an exclusive lock, so we can mutate the cluster.
            match action() {
                Ok(result) => {
                    lock.unlock()?;
                    Ok(Some(result))
                }
                Err(err) => Err(CoordinateError::ControlError(err)),
            }
        }
        Err(err) => Err(err.into()),
    }
}
