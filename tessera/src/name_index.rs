//! Names for records.
//!
//! Named pushes append a `(name, reference)` row to the reserved `_name_` layer. Lookups scan it
//! from the first row, so the oldest entry of a name wins and each lookup costs a full scan in
//! the worst case.

use tessera_dtype::FieldKind;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_layout::{BuildLayer, BuildStore, ColumnDef, ColumnSlice, LayerRead, RowRef};

/// The layer holding named references.
pub const NAME_LAYER: &str = "_name_";

const NAME: usize = 0;
const REFERENCE: usize = 1;

/// Add an empty `_name_` layer to `build`.
pub(crate) fn declare(build: &mut BuildStore) -> TesseraResult<u32> {
    let index = build.add_layer(NAME_LAYER)?;
    let layer = build.layer_mut(index)?;
    layer.add_field(ColumnDef::new("name", FieldKind::Str)?)?;
    layer.add_field(ColumnDef::new("reference", FieldKind::Ref)?)?;
    Ok(index)
}

pub(crate) fn append(layer: &mut BuildLayer, name: &str, target: RowRef) -> TesseraResult<()> {
    layer.begin_row()?;
    let written = layer
        .set_text(NAME, name)
        .and_then(|_| layer.set_reference(REFERENCE, target));
    if let Err(e) = written {
        layer.abort_row();
        return Err(e);
    }
    layer.end_row()?;
    log::trace!("named {target} \"{name}\"");
    Ok(())
}

/// The reference stored under the first row named `name`.
pub(crate) fn lookup(layer: &dyn LayerRead, name: &str) -> TesseraResult<Option<RowRef>> {
    let names = layer.committed_slice(NAME)?;
    let references = layer.committed_slice(REFERENCE)?;
    if !matches!(
        (&names, &references),
        (ColumnSlice::Str { .. }, ColumnSlice::Ref(_))
    ) {
        tessera_bail!(InvalidSerde: "layer {} is not a name index", layer.name());
    }
    for row in 0..names.len() {
        if names.text(row)? == name {
            return references.reference(row).map(Some);
        }
    }
    Ok(None)
}
