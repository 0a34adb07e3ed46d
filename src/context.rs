// src/context.rs
//! `.context()` on fallible calls and the `bail!`/`ensure!` early returns.
//!
//! Config and layout loading wrap parse failures with what was being read;
//! validation code bails with a formatted [`Error::Custom`].

use crate::error::{Error, Result};

/// Wraps the error of any `Result` whose error converts into [`Error`].
pub trait Context<T, E> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    /// Like [`Context::context`], but only builds the message on failure.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(context))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(f()))
    }
}

/// Returns early with an error: a message literal, anything convertible into
/// [`Error`], or a format string with arguments.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::msg($msg))
    };
    ($err:expr $(,)?) => {
        return Err(Into::<$crate::error::Error>::into($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::format(format_args!($fmt, $($arg)*)))
    };
}

/// `bail!` unless `cond` holds.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !($cond) {
            $crate::bail!($msg);
        }
    };
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($fmt, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceKind;

    fn bone_slot(count: usize, index: &str) -> Result<usize> {
        let index: usize = serde_json::from_str(index).with_context(|| format!("bone index '{index}'"))?;
        ensure!(count > 0, "asset has no bones");
        ensure!(index < count, "bone {} out of {}", index, count);
        Ok(index)
    }

    #[test]
    fn ensure_takes_literal_and_formatted_messages() {
        assert_eq!(bone_slot(0, "0").unwrap_err().to_string(), "asset has no bones");
        assert_eq!(bone_slot(2, "5").unwrap_err().to_string(), "bone 5 out of 2");
        assert_eq!(bone_slot(2, "1").unwrap(), 1);
    }

    #[test]
    fn context_keeps_the_root_error() {
        let err = bone_slot(2, "x").unwrap_err();
        assert!(err.to_string().starts_with("bone index 'x': "));
        assert!(matches!(err.root(), Error::Config(_)));
    }

    #[test]
    fn bail_accepts_an_error_value() {
        fn load() -> Result<()> {
            bail!(Error::load_failure(ResourceKind::Asset, "fur.apx"));
        }
        assert!(load().unwrap_err().is_resource_failure());
    }
}
