use crate::errors::CmDataError;
use polars::prelude::*;
use std::path::Path;

/// Run `op` inside a dedicated Rayon pool with `num_threads` workers.
///
/// A value of 0 uses all available cores.
pub fn run_with_threads<T, F>(num_threads: usize, op: F) -> T
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool.install(op),
        // Fall back to the global pool
        Err(_) => op(),
    }
}

/// Write a DataFrame to `file_path`, replacing its extension with the one of
/// `file_type`.
pub fn write_df_to_file(
    df: &mut DataFrame,
    file_path: &Path,
    file_type: DataFrameFileType,
) -> Result<(), CmDataError> {
    let file_suffix = file_type.to_string();
    let mut file = std::fs::File::create(file_path.with_extension(file_suffix))?;
    let written = match file_type {
        DataFrameFileType::Csv => CsvWriter::new(&mut file).finish(df),
        DataFrameFileType::Parquet => ParquetWriter::new(&mut file).finish(df).map(|_| ()),
        DataFrameFileType::Json => JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::Json)
            .finish(df),
        DataFrameFileType::NDJson => JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::JsonLines)
            .finish(df),
    };
    Ok(written?)
}

/// File format for writing DataFrames.
#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum DataFrameFileType {
    /// Comma-separated values
    Csv,
    /// Parquet columnar storage
    Parquet,
    /// Standard JSON
    Json,
    /// Newline-delimited JSON
    NDJson,
}

impl std::fmt::Display for DataFrameFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataFrameFileType::Csv => write!(f, "csv"),
            DataFrameFileType::Parquet => write!(f, "parquet"),
            DataFrameFileType::Json => write!(f, "json"),
            DataFrameFileType::NDJson => write!(f, "ndjson"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_threads() {
        let n = run_with_threads(2, rayon::current_num_threads);
        assert_eq!(n, 2);
    }

    #[test]
    fn test_write_csv() {
        let dir = std::env::temp_dir().join(format!("cmdata-utils-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut df = df!(
            "atom" => [1u32, 2, 3],
            "probability" => [0.5f64, 1.0, 0.0],
        )
        .unwrap();
        let path = dir.join("table");
        write_df_to_file(&mut df, &path, DataFrameFileType::Csv).unwrap();

        let content = std::fs::read_to_string(path.with_extension("csv")).unwrap();
        assert!(content.starts_with("atom,probability\n1,0.5\n"), "{content}");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
