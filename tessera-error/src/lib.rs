#![deny(missing_docs)]

//! Error handling for Tessera.
//!
//! Every fallible operation in the workspace returns a [`TesseraResult`]. Errors are built with
//! the [`tessera_err!`] and [`tessera_bail!`] macros, which capture a backtrace at the point of
//! construction.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{fmt, io};

pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for Tessera.
///
/// The first five variants form the error taxonomy of the mapping layer; the rest are raised by
/// the storage engine and the I/O plumbing underneath it.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum TesseraError {
    /// A field is not declared by a schema, or its annotation cannot be mapped to a field kind.
    #[error("schema error: {0}\nBacktrace:\n{1}")]
    Schema(ErrString, Backtrace),
    /// The operation is not valid for the current mode of the store or layer.
    #[error("state error: {0}\nBacktrace:\n{1}")]
    State(ErrString, Backtrace),
    /// A requested capacity is not positive, or a write exceeds a fixed-scale bound.
    #[error("capacity error: {0}\nBacktrace:\n{1}")]
    Capacity(ErrString, Backtrace),
    /// A file, shared-memory segment, layer or named record does not exist.
    #[error("not found: {0}\nBacktrace:\n{1}")]
    NotFound(ErrString, Backtrace),
    /// A value or record does not have the type declared for the field it is assigned to.
    #[error("expected type: {0} but instead got {1}\nBacktrace:\n{2}")]
    MismatchedTypes(ErrString, ErrString, Backtrace),
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// An argument is invalid.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// A buffer could not be parsed into a store layout.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidSerde(ErrString, Backtrace),
    /// An error with additional context attached.
    #[error("{0}: {1}")]
    Context(ErrString, Box<TesseraError>),
    /// An I/O error.
    #[error(transparent)]
    IOError(
        #[from]
        io::Error,
    ),
    /// A footer failed to serialize.
    #[cfg(feature = "flexbuffers")]
    #[error(transparent)]
    FlexBufferSerError(
        #[from]
        flexbuffers::SerializationError,
    ),
    /// A footer failed to deserialize.
    #[cfg(feature = "flexbuffers")]
    #[error(transparent)]
    FlexBufferDeError(
        #[from]
        flexbuffers::DeserializationError,
    ),
}

impl TesseraError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        TesseraError::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, skipping any [`TesseraError::Context`] layers.
    pub fn root(&self) -> &TesseraError {
        match self {
            TesseraError::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the root cause is a [`TesseraError::Schema`].
    pub fn is_schema(&self) -> bool {
        matches!(self.root(), TesseraError::Schema(..))
    }

    /// Whether the root cause is a [`TesseraError::State`].
    pub fn is_state(&self) -> bool {
        matches!(self.root(), TesseraError::State(..))
    }

    /// Whether the root cause is a [`TesseraError::Capacity`].
    pub fn is_capacity(&self) -> bool {
        matches!(self.root(), TesseraError::Capacity(..))
    }

    /// Whether the root cause is a [`TesseraError::NotFound`].
    ///
    /// I/O errors of kind [`io::ErrorKind::NotFound`] count as well.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            TesseraError::NotFound(..) => true,
            TesseraError::IOError(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether the root cause is a [`TesseraError::MismatchedTypes`].
    pub fn is_mismatched_types(&self) -> bool {
        matches!(self.root(), TesseraError::MismatchedTypes(..))
    }

    /// Whether the root cause is a [`TesseraError::OutOfBounds`].
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self.root(), TesseraError::OutOfBounds(..))
    }
}

impl Debug for TesseraError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return [`TesseraError`]s as their error type.
pub type TesseraResult<T> = Result<T, TesseraError>;

/// A trait for unwrapping a result whose failure would break an internal invariant.
pub trait TesseraUnwrap {
    /// The type of the value being unwrapped.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug.
    fn tessera_unwrap(self) -> Self::Output;
}

impl<T, E> TesseraUnwrap for Result<T, E>
where
    E: Into<TesseraError>,
{
    type Output = T;

    #[inline(always)]
    fn tessera_unwrap(self) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|err| crate::tessera_panic!(err))
    }
}

/// A trait for expect-ing a value or panicking with a [`TesseraError`].
pub trait TesseraExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug.
    fn tessera_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> TesseraExpect for Result<T, E>
where
    E: Into<TesseraError>,
{
    type Output = T;

    #[inline(always)]
    fn tessera_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| crate::tessera_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> TesseraExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn tessera_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = TesseraError::InvalidArgument(msg.to_string().into(), Backtrace::capture());
            crate::tessera_panic!(err)
        })
    }
}

/// A convenient macro for creating a [`TesseraError`].
///
/// The leading identifier selects the variant; a bare format string produces
/// [`TesseraError::InvalidArgument`].
#[macro_export]
macro_rules! tessera_err {
    (Schema: $($tts:tt)*) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::Schema(format!($($tts)*).into(), Backtrace::capture())
        )
    }};
    (State: $($tts:tt)*) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::State(format!($($tts)*).into(), Backtrace::capture())
        )
    }};
    (Capacity: $($tts:tt)*) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::Capacity(format!($($tts)*).into(), Backtrace::capture())
        )
    }};
    (NotFound: $($tts:tt)*) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::NotFound(format!($($tts)*).into(), Backtrace::capture())
        )
    }};
    (InvalidSerde: $($tts:tt)*) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::InvalidSerde(format!($($tts)*).into(), Backtrace::capture())
        )
    }};
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    (MismatchedTypes: $expected:literal, $actual:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::MismatchedTypes(
                $expected.into(),
                $actual.to_string().into(),
                Backtrace::capture(),
            )
        )
    }};
    (MismatchedTypes: $expected:expr, $actual:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::MismatchedTypes(
                $expected.to_string().into(),
                $actual.to_string().into(),
                Backtrace::capture(),
            )
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::TesseraError::Context($msg.into(), Box::new($err))
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::TesseraError::InvalidArgument(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
}

/// A convenient macro for returning a [`TesseraError`] from the enclosing function.
#[macro_export]
macro_rules! tessera_bail {
    ($($tt:tt)+) => {
        return Err($crate::tessera_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a [`TesseraError`] in the presence of a programmer
/// error (e.g., a violated invariant).
#[macro_export]
macro_rules! tessera_panic {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::tessera_panic!($crate::tessera_err!(OutOfBounds: $idx, $start, $stop))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::tessera_panic!($crate::tessera_err!($fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::TesseraError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($err:expr) => {{
        let err: $crate::TesseraError = $err;
        panic!("{}", err)
    }};
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::TesseraError) -> crate::TesseraError {
        error
    }
}
