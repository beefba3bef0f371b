use crate::{ErrString, TesseraError, TesseraResult};

/// Extension trait for results whose error converts into a [`TesseraError`].
pub trait ResultExt<T>: private::Sealed {
    /// Wrap the error, if any, with a message describing what was being attempted.
    fn context<M: Into<ErrString>>(self, msg: M) -> TesseraResult<T>;

    /// Like [`ResultExt::context`], but the message is only built on failure.
    fn with_context<M: Into<ErrString>, F: FnOnce() -> M>(self, f: F) -> TesseraResult<T>;
}

mod private {
    pub trait Sealed {}

    impl<T, E: Into<crate::TesseraError>> Sealed for Result<T, E> {}
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<TesseraError>,
{
    fn context<M: Into<ErrString>>(self, msg: M) -> TesseraResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<M: Into<ErrString>, F: FnOnce() -> M>(self, f: F) -> TesseraResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}
