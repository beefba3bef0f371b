use std::io::Write;
use std::path::Path;

use itertools::Itertools;

use tessera::buffer::Region;
use tessera::dtype::FieldKind;
use tessera::error::{TesseraResult, tessera_bail, tessera_err};
use tessera::io::read_file;
use tessera::layout::{FixedStore, LayerRead, TESSERA_FILE_EXTENSION};

/// Parse a store from a file or a shared memory segment without attaching a [`tessera::Store`].
pub fn open(locator: &str, shm: bool) -> TesseraResult<FixedStore> {
    let region = if shm {
        shared_region(locator)?
    } else {
        warn_on_extension(Path::new(locator));
        Region::from(read_file(locator)?)
    };
    FixedStore::parse(region)
}

/// Whether `path` ends in the store file extension.
pub fn has_store_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TESSERA_FILE_EXTENSION))
}

pub fn warn_on_extension(path: &Path) {
    if !has_store_extension(path) {
        log::warn!(
            "{} does not end in .{TESSERA_FILE_EXTENSION}, it may not be a store",
            path.display()
        );
    }
}

#[cfg(unix)]
fn shared_region(name: &str) -> TesseraResult<Region> {
    Ok(tessera::attach(name)?.into_parts().1)
}

#[cfg(not(unix))]
fn shared_region(name: &str) -> TesseraResult<Region> {
    tessera_bail!(State: "cannot open {}: shared memory requires unix", name)
}

/// Write the name, row count and columns of every layer, or of `only`, followed by up to `rows`
/// rows with one tab-separated cell per column.
pub fn dump(
    store: &FixedStore,
    only: Option<&str>,
    rows: u32,
    out: &mut impl Write,
) -> TesseraResult<()> {
    if let Some(name) = only.filter(|name| store.find_layer(name).is_none()) {
        tessera_bail!(NotFound: "no layer {}", name);
    }

    for layer in store.layers() {
        if only.is_some_and(|name| name != layer.name()) {
            continue;
        }
        writeln!(
            out,
            "{} ({} rows) {{{}}}",
            layer.name(),
            layer.row_count(),
            layer.columns().iter().format(", ")
        )?;
        if rows == 0 {
            continue;
        }

        for row in 0..layer.row_count().min(rows) {
            let cells = (0..layer.columns().len())
                .map(|column| cell(&layer, column, row))
                .collect::<TesseraResult<Vec<_>>>()?;
            writeln!(out, "  {}", cells.join("\t"))?;
        }
        if layer.row_count() > rows {
            writeln!(out, "  ... {} more", layer.row_count() - rows)?;
        }
    }
    Ok(())
}

fn cell(layer: &dyn LayerRead, column: usize, row: u32) -> TesseraResult<String> {
    let def = layer.column(column)?;
    Ok(match def.kind() {
        kind if kind.is_numeric() => {
            let value = layer.get_scalar(column, row)?.decode(kind, def.range());
            value
                .as_f64()
                .ok_or_else(|| tessera_err!("cannot print {} cell", kind))?
                .to_string()
        }
        FieldKind::Str => layer.get_text(column, row)?.to_string(),
        FieldKind::WStr => layer.get_wtext(column, row)?,
        FieldKind::Bytes => format!("<{} bytes>", layer.get_blob(column, row)?.len()),
        FieldKind::Ref => layer.get_reference(column, row)?.to_string(),
        other => tessera_bail!(InvalidSerde: "column {} has kind {}", def.name(), other),
    })
}
