use anyhow::anyhow;
use formatx::formatx;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::str::from_utf8;
use std::sync::Arc;

/// Destination for the named documents produced by a run ("airflow_results", "airflow_program")
pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    /// Arguments:
    /// * `directory_path` - directory the files are written into
    /// * `file_template` - file name with a `{}` placeholder for the location key, e.g. "house__{}.json"
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        let file_name = formatx!(&self.file_template, location_key).map_err(|err| {
            anyhow!(
                "Could not build a file name from template '{}': {err:?}",
                self.file_template
            )
        })?;
        Ok(BufWriter::new(File::create(
            self.directory_path.join(file_name),
        )?))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Collects every document into one shared string, each preceded by a header naming its
/// location key.
#[derive(Clone, Debug, Default)]
pub struct StringOutput(Arc<Mutex<String>>);

impl StringOutput {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn contents(&self) -> String {
        self.0.lock().clone()
    }
}

impl Output for StringOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(DocumentWriter {
            string: self.0.clone(),
            location_key: location_key.to_string(),
            has_header: false,
        })
    }
}

impl Output for &StringOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <StringOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// Writer for one document within a `StringOutput`
struct DocumentWriter {
    string: Arc<Mutex<String>>,
    location_key: String,
    has_header: bool,
}

impl Write for DocumentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let utf8 = from_utf8(buf).map_err(|_| {
            io::Error::new(ErrorKind::InvalidData, "Tried to write out invalid UTF-8.")
        })?;
        let mut string = self.string.lock();
        if !self.has_header {
            if !string.is_empty() {
                string.push_str("\n\n");
            }
            string.push_str(&format!("Writing out '{}':\n\n", self.location_key));
            self.has_header = true;
        }
        string.push_str(utf8);
        Ok(utf8.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
