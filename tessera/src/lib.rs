//! Typed records over a columnar store.
//!
//! Record types are declared once with [`schema!`](tessera_dtype::schema) and then written into a
//! [`Store`] row by row. A store starts out in build mode, where layers grow by appending rows,
//! and is frozen into fixed mode by [`Store::combine`], [`Store::save`] followed by
//! [`Store::open`], or [`Store::share`]. Fixed stores live in one contiguous buffer, either on
//! the heap or in a shared memory segment other processes can [`Store::attach`] to, and expose
//! both per-row [`Record`]s and whole-column [`ColumnView`]s over the same bytes.
//!
//! ```
//! use tessera::dtype::kinds::*;
//! use tessera::{Record, Scale, Store};
//!
//! tessera::dtype::schema! {
//!     pub struct Point { x: F64, y: F64 }
//! }
//!
//! let store = Store::truncate([Scale::new::<Point>(3)]).unwrap();
//! let points = store.layer::<Point>().unwrap();
//! points.column().unwrap().write::<f64>("x").unwrap()[2] = 4.0;
//! assert_eq!(points.get(2).unwrap().get_as::<f64>("x").unwrap(), 4.0);
//!
//! let built = Store::create();
//! let reference = built
//!     .push(&Record::new::<Point>().with("y", 1.5).unwrap(), Some("origin"))
//!     .unwrap();
//! let origin = built.get::<Point>("origin").unwrap().unwrap();
//! assert_eq!(origin, built.resolve::<Point>(reference).unwrap());
//! ```

pub use column::*;
pub use layer::*;
pub use name_index::NAME_LAYER;
#[cfg(unix)]
pub use publish::*;
pub use record::*;
pub use resolve::*;
pub use scale::*;
pub use store::*;
pub use value::*;
pub use {
    tessera_buffer as buffer, tessera_dtype as dtype, tessera_error as error, tessera_io as io,
    tessera_layout as layout,
};

mod column;
mod layer;
mod name_index;
#[cfg(unix)]
mod publish;
mod push;
mod record;
mod resolve;
mod scale;
mod state;
mod store;
#[cfg(test)]
mod tests;
mod value;

/// The deepest chain of nested records that is followed when pushing or copying a record.
pub const MAX_NESTING: usize = 64;
