use tessera_error::{TesseraResult, tessera_bail};

use crate::Alignment;

/// Plain fixed-width values that are valid for every bit pattern.
///
/// Sealed: only primitive numeric types may be cast out of raw bytes.
pub trait Pod: private::Sealed + Copy + Send + Sync + 'static {}

mod private {
    pub trait Sealed {}
}

macro_rules! pod {
    ($($T:ty),*) => {
        $(
            impl private::Sealed for $T {}
            impl Pod for $T {}
        )*
    };
}

pod!(u8, u16, u32, u64, i32, f32, f64);

fn check_cast<T: Pod>(ptr: *const u8, len: usize) -> TesseraResult<usize> {
    if !Alignment::of::<T>().is_ptr_aligned(ptr) {
        tessera_bail!(
            InvalidSerde: "byte slice is not aligned to {} for {}",
            Alignment::of::<T>(),
            std::any::type_name::<T>()
        );
    }
    if len % size_of::<T>() != 0 {
        tessera_bail!(
            InvalidSerde: "byte length {} is not a multiple of the size of {}",
            len,
            std::any::type_name::<T>()
        );
    }
    Ok(len / size_of::<T>())
}

/// View `bytes` as a slice of `T` without copying.
pub fn cast_slice<T: Pod>(bytes: &[u8]) -> TesseraResult<&[T]> {
    let len = check_cast::<T>(bytes.as_ptr(), bytes.len())?;
    // SAFETY: alignment and length were checked above and every bit pattern is a valid `T`.
    Ok(unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast(), len) })
}

/// View `bytes` as a mutable slice of `T` without copying.
pub fn cast_slice_mut<T: Pod>(bytes: &mut [u8]) -> TesseraResult<&mut [T]> {
    let len = check_cast::<T>(bytes.as_ptr(), bytes.len())?;
    // SAFETY: alignment and length were checked above, every bit pattern is a valid `T`, and the
    // exclusive borrow of `bytes` is carried over to the result.
    Ok(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast(), len) })
}

/// View a slice of `T` as its raw bytes.
pub fn as_bytes<T: Pod>(values: &[T]) -> &[u8] {
    // SAFETY: `T` has no padding and any initialized memory is a valid `u8`.
    unsafe { std::slice::from_raw_parts(values.as_ptr().cast(), size_of_val(values)) }
}
