use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::{
    arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties,
};
use std::{fs, fs::File, path::Path};
use tracing::info;

/// Write `batch` to `path` as a single Snappy-compressed Parquet file.
///
/// The file is written under a `.tmp` name and renamed once closed.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("parquet.tmp");

    let tmp_file = File::create(&tmp_path)
        .with_context(|| format!("creating temporary Parquet file {}", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(tmp_file, batch.schema(), Some(props))
        .context("initializing Parquet writer")?;
    writer.write(batch).context("writing dataset to Parquet")?;
    writer.close().context("closing Parquet writer")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;
    info!(path = %path.display(), rows = batch.num_rows(), "wrote Parquet export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::categorize::force_categorize;
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn export_reads_back() -> Result<()> {
        let batch = RecordBatch::try_from_iter(vec![
            ("CNPJ_Fundo", Arc::new(StringArray::from(vec!["a", "b", "a"])) as ArrayRef),
            ("Valor_CRI", Arc::new(Float64Array::from(vec![Some(1.0), None, Some(2.5)]))),
        ])?;
        let batch = force_categorize(&batch, "CNPJ_Fundo")?;

        let dir = tempdir()?;
        let path = dir.path().join("out").join("fii.parquet");
        write_parquet(&batch, &path)?;
        assert!(path.exists());
        assert!(!path.with_extension("parquet.tmp").exists());

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        let rows: usize = reader
            .map(|b| b.map(|b| b.num_rows()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();
        assert_eq!(rows, 3);
        Ok(())
    }
}
