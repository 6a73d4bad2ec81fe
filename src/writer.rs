use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{CommodityCode, TimePeriod};
use crate::error::MatrixError;
use crate::matrix::TradeMatrix;

pub const LABEL_COLUMN: &str = "iso3";

#[derive(Debug, Clone)]
pub struct MatrixWriter {
    output_dir: Utf8PathBuf,
}

impl MatrixWriter {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn ensure_output_dir(&self) -> Result<(), MatrixError> {
        fs::create_dir_all(self.output_dir.as_std_path())
            .map_err(|err| MatrixError::Filesystem(err.to_string()))
    }

    pub fn matrix_path(&self, commodity: &CommodityCode, period: TimePeriod) -> Utf8PathBuf {
        self.output_dir.join(format!("{commodity}_{period}.csv"))
    }

    /// Write one matrix; the file only appears once it is complete.
    pub fn write(
        &self,
        commodity: &CommodityCode,
        period: TimePeriod,
        matrix: &TradeMatrix,
    ) -> Result<Utf8PathBuf, MatrixError> {
        self.ensure_output_dir()?;
        let path = self.matrix_path(commodity, period);
        let mut temp = tempfile::Builder::new()
            .prefix("comtrade-matrix")
            .suffix(".tmp")
            .tempfile_in(self.output_dir.as_std_path())
            .map_err(|err| MatrixError::Filesystem(err.to_string()))?;

        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            write_matrix(&mut writer, matrix)?;
            writer
                .flush()
                .map_err(|err| MatrixError::Filesystem(err.to_string()))?;
        }
        temp.as_file_mut()
            .sync_all()
            .map_err(|err| MatrixError::Filesystem(err.to_string()))?;

        temp.persist(path.as_std_path())
            .map_err(|err| MatrixError::Filesystem(err.to_string()))?;
        Ok(path)
    }
}

pub fn write_matrix<W: Write>(
    writer: &mut csv::Writer<W>,
    matrix: &TradeMatrix,
) -> Result<(), MatrixError> {
    let mut header = Vec::with_capacity(matrix.size() + 1);
    header.push(LABEL_COLUMN.to_string());
    header.extend(matrix.labels().iter().cloned());
    writer.write_record(&header)?;

    for (row, label) in matrix.labels().iter().enumerate() {
        let mut record = Vec::with_capacity(matrix.size() + 1);
        record.push(label.clone());
        record.extend(matrix.row(row).iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
    }
    Ok(())
}
