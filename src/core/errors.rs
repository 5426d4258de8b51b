//! Error handling for the core engine.
//!
//! We use `anyhow` throughout the core, with the [`atry!`] and [`a_ok_or!`]
//! macros attaching a sentence describing what was being attempted. Error
//! classes that callers need to react to (locked files, publish cycles,
//! malformed constraints, ...) are distinct `thiserror` types living next to
//! the code that raises them; they can be recovered from an [`Error`] with
//! `downcast_ref`.

pub use anyhow::Error;

/// The result type used by the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Try an operation, annotating any error with a formatted context message.
///
/// ```ignore
/// let text = atry!(
///     std::fs::read_to_string(&path);
///     ["failed to read `{}`", path.display()]
/// );
/// ```
#[macro_export]
macro_rules! atry {
    ($op:expr ; [ $($msg:tt)+ ]) => {
        match $op {
            Ok(value) => value,
            Err(e) => {
                let err: anyhow::Error = e.into();
                return Err(err.context(format!($($msg)+)).into());
            }
        }
    };
}

/// Unwrap an `Option`, returning a formatted error if it is `None`.
#[macro_export]
macro_rules! a_ok_or {
    ($option:expr ; [ $($msg:tt)+ ]) => {
        match $option {
            Some(value) => value,
            None => return Err(anyhow::anyhow!($($msg)+).into()),
        }
    };
}
