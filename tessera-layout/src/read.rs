use tessera_dtype::PValue;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{ColumnDef, ColumnSlice, RowRef};

/// Read access to the cells of one layer, shared by build and fixed layers.
pub trait LayerRead {
    fn name(&self) -> &str;

    fn columns(&self) -> &[ColumnDef];

    /// The number of committed rows.
    fn row_count(&self) -> u32;

    /// Every cell of a column. May include a row that is still being appended.
    fn column_slice(&self, column: usize) -> TesseraResult<ColumnSlice<'_>>;

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name().as_ref() == name)
    }

    fn column(&self, column: usize) -> TesseraResult<&ColumnDef> {
        self.columns()
            .get(column)
            .ok_or_else(|| tessera_err!(OutOfBounds: column, 0, self.columns().len()))
    }

    /// Fails unless `row` is a committed row.
    fn check_row(&self, row: u32) -> TesseraResult<usize> {
        if row >= self.row_count() {
            tessera_bail!(OutOfBounds: row as usize, 0, self.row_count() as usize);
        }
        Ok(row as usize)
    }

    fn get_scalar(&self, column: usize, row: u32) -> TesseraResult<PValue> {
        let row = self.check_row(row)?;
        self.column_slice(column)?.scalar(row)
    }

    fn get_text(&self, column: usize, row: u32) -> TesseraResult<&str> {
        let row = self.check_row(row)?;
        self.column_slice(column)?.text(row)
    }

    fn get_wtext(&self, column: usize, row: u32) -> TesseraResult<String> {
        let row = self.check_row(row)?;
        self.column_slice(column)?.wide_text(row)
    }

    fn get_blob(&self, column: usize, row: u32) -> TesseraResult<&[u8]> {
        let row = self.check_row(row)?;
        self.column_slice(column)?.blob(row)
    }

    fn get_reference(&self, column: usize, row: u32) -> TesseraResult<RowRef> {
        let row = self.check_row(row)?;
        self.column_slice(column)?.reference(row)
    }

    /// The committed cells of a column.
    fn committed_slice(&self, column: usize) -> TesseraResult<ColumnSlice<'_>> {
        self.column_slice(column)?.head(self.row_count() as usize)
    }
}
