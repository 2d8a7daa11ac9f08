//! Storage for emitted solution rows.
//!
//! Each reported output time produces one row: the time, the interpolated
//! state, and any auxiliary-output values. Rows either accumulate in memory
//! for postprocessing or stream incrementally to a CSV file.

use csv::Writer;
use std::error::Error;
use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::BufWriter;
use std::path::PathBuf;

/// Specifies the saving strategy used by an integration.
///
/// - `Memory`: keep all rows in memory.
/// - `File`: write rows incrementally to a CSV file.
/// - `None`: disable solver-side saving (the caller handles everything
///   through the auxiliary-output callback).
#[derive(Debug, Clone)]
pub enum SaveMethod {
    Memory,
    File(PathBuf),
    None,
}

/// Runtime storage selected from a [`SaveMethod`].
pub enum ResultStorage {
    Memory(MemoryResult),
    File(StateWriter),
    None,
}

impl ResultStorage {
    /// In-memory storage, the common case.
    pub fn memory() -> Self {
        ResultStorage::Memory(MemoryResult::new(32))
    }

    pub fn from_method(
        method: &SaveMethod,
        n: usize,
        n_out: usize,
    ) -> Result<Self, Box<dyn Error>> {
        match method {
            SaveMethod::Memory => Ok(Self::memory()),
            SaveMethod::None => Ok(ResultStorage::None),
            SaveMethod::File(path) => {
                let mut headers = vec!["t".to_string()];
                headers.extend((0..n).map(|i| format!("y{i}")));
                headers.extend((0..n_out).map(|i| format!("out{i}")));
                let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
                let writer = StateWriterBuilder::new(1 + n + n_out, path.clone())
                    .with_headers(&headers)?
                    .build()?;
                Ok(ResultStorage::File(writer))
            }
        }
    }

    /// Save one emitted row. No-op when storage is `None`.
    pub fn save(&mut self, t: f64, y: &[f64], out: &[f64]) -> Result<(), Box<dyn Error>> {
        match self {
            ResultStorage::Memory(result) => {
                result.insert(t, y, out);
                Ok(())
            }
            ResultStorage::File(writer) => writer.write_row(t, y, out),
            ResultStorage::None => Ok(()),
        }
    }

    /// Finalize storage.
    ///
    /// For `Memory`, this truncates the buffers to the filled rows. For
    /// `File`, this flushes the buffered writer.
    pub fn truncate(&mut self) -> Result<(), Box<dyn Error>> {
        match self {
            ResultStorage::Memory(result) => result.truncate(),
            ResultStorage::File(writer) => writer.flush()?,
            ResultStorage::None => {}
        }
        Ok(())
    }

    pub fn as_memory(&self) -> Option<&MemoryResult> {
        match self {
            ResultStorage::Memory(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_memory(self) -> Option<MemoryResult> {
        match self {
            ResultStorage::Memory(result) => Some(result),
            _ => None,
        }
    }
}

/// A preallocated and growable container of `(time, state, auxiliary
/// output)` rows. Rows land at the insert cursor; [`ResultStorage::truncate`]
/// trims the unused capacity once the integration is done.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryResult {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    pub out: Vec<Vec<f64>>,
    /// Current insert index.
    i: usize,
}

impl MemoryResult {
    /// Constructs a result buffer preallocated for `n` rows.
    pub fn new(n: usize) -> Self {
        Self {
            t: vec![0.0; n],
            y: vec![Vec::new(); n],
            out: vec![Vec::new(); n],
            i: 0,
        }
    }

    /// Number of saved rows.
    pub fn len(&self) -> usize {
        self.i
    }

    pub fn is_empty(&self) -> bool {
        self.i == 0
    }

    /// Inserts a new row, doubling the buffers when full.
    fn insert(&mut self, t: f64, y: &[f64], out: &[f64]) {
        if self.i == self.t.len() {
            self.extend();
        }
        self.t[self.i] = t;
        self.y[self.i].clear();
        self.y[self.i].extend_from_slice(y);
        self.out[self.i].clear();
        self.out[self.i].extend_from_slice(out);
        self.i += 1;
    }

    /// Doubles the size of the buffers to accommodate more rows.
    fn extend(&mut self) {
        let grow = self.t.len().max(1);
        self.t.extend(vec![0.0; grow]);
        self.y.extend(vec![Vec::new(); grow]);
        self.out.extend(vec![Vec::new(); grow]);
    }

    /// Truncates the buffers to contain only the filled rows.
    fn truncate(&mut self) {
        self.t.truncate(self.i);
        self.y.truncate(self.i);
        self.out.truncate(self.i);
    }
}

#[derive(Debug, Clone)]
pub struct StateWriterBuilder {
    headers: Option<Vec<String>>,
    pub ncols: usize,
    file_path: PathBuf,
}

impl StateWriterBuilder {
    pub fn new(ncols: usize, file_path: PathBuf) -> Self {
        Self { file_path, headers: None, ncols }
    }

    pub fn with_headers(mut self, headers: &[&str]) -> Result<Self, Box<dyn Error>> {
        if headers.len() != self.ncols {
            return Err(format!(
                "header length ({}) must be equal to ncols ({})",
                headers.len(),
                self.ncols
            )
            .into());
        }
        self.headers = Some(
            headers
                .iter()
                .map(|header| header.to_string())
                .collect(),
        );
        Ok(self)
    }

    pub fn build(&self) -> Result<StateWriter, Box<dyn Error>> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = File::create(&self.file_path)?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        if let Some(headers) = &self.headers {
            writer.write_record(headers)?;
        }
        Ok(StateWriter {
            string_buffer: vec![String::new(); self.ncols],
            ncols: self.ncols,
            writer,
        })
    }
}

pub struct StateWriter {
    string_buffer: Vec<String>,
    ncols: usize,
    writer: Writer<BufWriter<File>>,
}

impl StateWriter {
    /// Writes one emitted row as a csv record.
    pub fn write_row(&mut self, t: f64, y: &[f64], out: &[f64]) -> Result<(), Box<dyn Error>> {
        if 1 + y.len() + out.len() != self.ncols {
            return Err(format!(
                "row width ({}) must be equal to ncols ({})",
                1 + y.len() + out.len(),
                self.ncols
            )
            .into());
        }
        for buffer in &mut self.string_buffer {
            buffer.clear();
        }
        write!(self.string_buffer[0], "{t}")?;
        for (i, value) in y.iter().chain(out).enumerate() {
            write!(self.string_buffer[i + 1], "{value}")?;
        }
        self.writer.write_record(&self.string_buffer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        self.writer.flush()?;
        Ok(())
    }
}
