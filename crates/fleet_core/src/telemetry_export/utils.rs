use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::driver::StatusKind;

/// Named arrays in schema order; field types come from the arrays.
#[derive(Default)]
pub(super) struct Columns {
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
}

impl Columns {
    pub(super) fn required(self, name: &str, array: ArrayRef) -> Self {
        self.push(name, array, false)
    }

    pub(super) fn nullable(self, name: &str, array: ArrayRef) -> Self {
        self.push(name, array, true)
    }

    fn push(mut self, name: &str, array: ArrayRef, nullable: bool) -> Self {
        self.fields
            .push(Field::new(name, array.data_type().clone(), nullable));
        self.arrays.push(array);
        self
    }

    /// Writes every column as a single record batch.
    pub(super) fn write_parquet<P: AsRef<Path>>(self, path: P) -> Result<(), Box<dyn Error>> {
        let schema = Arc::new(Schema::new(self.fields));
        let batch = RecordBatch::try_new(schema.clone(), self.arrays)?;
        let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

pub(super) fn cell_to_u64(cell: h3o::CellIndex) -> u64 {
    cell.into()
}

pub(super) fn status_code(kind: StatusKind) -> u8 {
    match kind {
        StatusKind::Idle => 0,
        StatusKind::Reposition => 1,
        StatusKind::Assigned => 2,
    }
}
