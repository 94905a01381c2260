use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::{Bound, Range};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Deserializer;

use super::CatalogEngine;
use crate::error::{Result, ShelfError};
use tracing::{debug, info, instrument};

// the size threshold (in bytes) of stale log data that will trigger a log compaction
const COMPACTION_THRESHOLD: u64 = 1024 * 1024;

/// A log-structured [`CatalogEngine`].
///
/// Every insert, update and removal is appended as a JSON command to a "command log" kept in
/// the store's working directory. An in-memory, ordered index maps each key to the position of
/// its latest value within the logs, which is what makes prefix scans and "greatest key under
/// a prefix" lookups cheap.
///
/// Once the size of "stale" data in the logs hits the compaction threshold, the live entries
/// are copied into a fresh log and the old log files are deleted.
///
/// A `KvStore` is a cheap handle; clones share the same underlying logs and index, and every
/// operation runs under one lock, so `insert_new` is atomic with respect to all clones.
#[derive(Debug, Clone)]
pub struct KvStore {
    inner: Arc<Mutex<LogStore>>,
}

#[derive(Debug)]
struct LogStore {
    // path to the directory containing the command log files
    working_dir: PathBuf,

    // the current log generation number that is in use
    current_log_gen: u64,

    // maps generation numbers to a file Reader that will read from the log file
    readers: HashMap<u64, BufReaderWithPos<File>>,

    // writer of the current command log.
    writer: BufWriterWithPos<File>,

    // maps keys to their position within a log file.
    index: BTreeMap<String, CommandPos>,

    // number of bytes representing "stale" commands that could be
    // deleted during a compaction.
    uncompacted: u64,
}

impl KvStore {
    /// opens a [`KvStore`] using the given `working_dir` as the directory where the store's
    /// logs are kept. If the `working_dir` does not exist it will be created.
    #[instrument]
    pub fn open(working_dir: &Path) -> Result<KvStore> {
        info!("opening catalog log store version {}", env!("CARGO_PKG_VERSION"));
        fs::create_dir_all(working_dir)?;
        debug!("working_dir absolute path= {:?}", working_dir.canonicalize()?);

        // get all log gen numbers in the working dir
        let log_gens = get_log_gens(working_dir)?;
        debug!(?log_gens);

        let mut readers: HashMap<u64, BufReaderWithPos<File>> = HashMap::new();
        let mut index = BTreeMap::new();
        let mut uncompacted = 0_u64;

        for gen in &log_gens {
            let mut reader = BufReaderWithPos::new(File::open(build_log_path(working_dir, *gen))?)?;
            uncompacted += load(*gen, &mut reader, &mut index)?;
            readers.insert(*gen, reader);
        }
        debug!(uncompacted, keys = index.len());

        let current_log_gen = log_gens.last().unwrap_or(&0) + 1;
        let writer = new_log_file(working_dir, current_log_gen, &mut readers)?;

        Ok(KvStore {
            inner: Arc::new(Mutex::new(LogStore {
                working_dir: working_dir.to_path_buf(),
                current_log_gen,
                readers,
                writer,
                index,
                uncompacted,
            })),
        })
    }

    /// Clears stale entries in the command logs.
    pub fn compact(&self) -> Result<()> {
        self.lock()?.compact()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogStore>> {
        self.inner
            .lock()
            .map_err(|_| ShelfError::Internal("kv store lock poisoned by a panicked writer".to_string()))
    }
}

impl LogStore {
    fn compact(&mut self) -> Result<()> {
        // current_gen + 1 is for the compaction file, current_gen + 2 for new writes
        let compaction_gen = self.current_log_gen + 1;
        self.current_log_gen += 2;
        self.writer = new_log_file(&self.working_dir, self.current_log_gen, &mut self.readers)?;

        let mut compaction_writer = new_log_file(&self.working_dir, compaction_gen, &mut self.readers)?;
        let mut new_pos = 0;

        for cmd_pos in self.index.values_mut() {
            let reader = self
                .readers
                .get_mut(&cmd_pos.gen)
                .ok_or_else(|| ShelfError::Internal(format!("no log reader for gen {}", cmd_pos.gen)))?;
            if reader.pos != cmd_pos.pos {
                reader.seek(SeekFrom::Start(cmd_pos.pos))?;
            }

            let mut entry_reader = reader.take(cmd_pos.len);
            let len = io::copy(&mut entry_reader, &mut compaction_writer)?;
            *cmd_pos = (compaction_gen, new_pos..new_pos + len).into();
            new_pos += len;
        }
        compaction_writer.flush()?;

        let stale_gens: Vec<_> = self
            .readers
            .keys()
            .filter(|&&gen| gen < compaction_gen)
            .cloned()
            .collect();
        for stale_gen in stale_gens {
            self.readers.remove(&stale_gen);
            fs::remove_file(build_log_path(&self.working_dir, stale_gen))?;
        }
        debug!(compaction_gen, reclaimed = self.uncompacted, "compacted command logs");
        self.uncompacted = 0;

        Ok(())
    }

    /// appends a Set command and points the index at it
    fn append_set(&mut self, key: String, value: String) -> Result<()> {
        let cmd = Command::Set { key, value };
        let pos = self.writer.pos;
        serde_json::to_writer(&mut self.writer, &cmd)?;
        self.writer.flush()?;

        if let Command::Set { key, .. } = cmd {
            if let Some(old_command) = self
                .index
                .insert(key, (self.current_log_gen, pos..self.writer.pos).into())
            {
                self.uncompacted += old_command.len;
            }
        }

        if self.uncompacted > COMPACTION_THRESHOLD {
            self.compact()?;
        }
        Ok(())
    }

    /// reads the value of the Set command found at `cmd_pos`
    fn read_value(&mut self, key: &str, cmd_pos: CommandPos) -> Result<String> {
        let CommandPos { gen, pos, len } = cmd_pos;
        let reader = self
            .readers
            .get_mut(&gen)
            .ok_or_else(|| ShelfError::Internal(format!("no log reader for gen {}", gen)))?;

        reader.seek(SeekFrom::Start(pos))?;
        let cmd_reader = reader.take(len);
        match serde_json::from_reader(cmd_reader)? {
            Command::Set { value, .. } => Ok(value),
            Command::Remove { .. } => Err(ShelfError::Internal(format!(
                "invalid command in logs for key: {} gen: {} pos: {} len: {}",
                key, gen, pos, len
            ))),
        }
    }
}

impl CatalogEngine for KvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut store = self.lock()?;
        match store.index.get(key).copied() {
            Some(cmd_pos) => store.read_value(key, cmd_pos).map(Some),
            None => Ok(None),
        }
    }

    fn insert_new(&self, key: String, value: String) -> Result<()> {
        let mut store = self.lock()?;
        if store.index.contains_key(&key) {
            debug!(%key, "rejected insert of an existing key");
            return Err(ShelfError::DuplicateKey(key));
        }
        store.append_set(key, value)
    }

    fn set(&self, key: String, value: String) -> Result<()> {
        self.lock()?.append_set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut store = self.lock()?;
        if let Some(old_command) = store.index.remove(key) {
            let command = Command::Remove { key: key.to_string() };
            serde_json::to_writer(&mut store.writer, &command)?;
            store.writer.flush()?;
            store.uncompacted += old_command.len;
            Ok(())
        } else {
            Err(ShelfError::KeyNotFound)
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.index.contains_key(key))
    }

    fn last_key_with_prefix(&self, prefix: &str) -> Result<Option<String>> {
        let store = self.lock()?;
        let last = prefixed(&store.index, prefix).last().map(|(key, _)| key.clone());
        Ok(last)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut store = self.lock()?;
        let positions: Vec<(String, CommandPos)> = prefixed(&store.index, prefix)
            .map(|(key, cmd_pos)| (key.clone(), *cmd_pos))
            .collect();

        let mut entries = Vec::with_capacity(positions.len());
        for (key, cmd_pos) in positions {
            let value = store.read_value(&key, cmd_pos)?;
            entries.push((key, value));
        }
        Ok(entries)
    }
}

/// iterates, in key order, over the index entries whose key starts with `prefix`
fn prefixed<'a>(
    index: &'a BTreeMap<String, CommandPos>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a CommandPos)> + 'a {
    index
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
}

/// loads the commands from the given reader into the given `index` map
/// returns the amount of bytes that could be compacted.
/// `gen` is the generation number of the file being read by `reader`
fn load(
    gen: u64,
    reader: &mut BufReaderWithPos<File>,
    index: &mut BTreeMap<String, CommandPos>,
) -> Result<u64> {
    let mut pos = reader.seek(SeekFrom::Start(0))?;
    let mut uncompacted = 0_u64;
    let mut stream = Deserializer::from_reader(reader).into_iter::<Command>();

    while let Some(command) = stream.next() {
        let length = stream.byte_offset() as u64 - pos;
        match command? {
            Command::Set { key, .. } => {
                if let Some(old_command) = index.insert(key, CommandPos::new(gen, pos, length)) {
                    uncompacted += old_command.len;
                }
            }
            Command::Remove { key } => {
                if let Some(old_command) = index.remove(&key) {
                    uncompacted += old_command.len;
                }
                // this "remove" command itself can be deleted in the next compaction
                uncompacted += length;
            }
        }
        pos = stream.byte_offset() as u64;
    }

    Ok(uncompacted)
}

/// Constructs a log file path of the form `{gen}.log` within `dir`
fn build_log_path(dir: &Path, gen: u64) -> PathBuf {
    dir.join(format!("{}.log", gen))
}

/// Create a new log file with given generation number and add the reader to the readers map.
///
/// Returns the writer to the log.
fn new_log_file(
    path: &Path,
    gen: u64,
    readers: &mut HashMap<u64, BufReaderWithPos<File>>,
) -> Result<BufWriterWithPos<File>> {
    let path = build_log_path(path, gen);
    let writer = BufWriterWithPos::new(
        OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(&path)?,
    )?;

    readers.insert(gen, BufReaderWithPos::new(File::open(&path)?)?);
    Ok(writer)
}

/// These are the command types that will be recorded in the command log(s)
#[derive(Serialize, Deserialize, Debug)]
enum Command {
    Set { key: String, value: String },
    Remove { key: String },
}

/// Holds position data for commands that have been written into a command log.
#[derive(Debug, Copy, Clone)]
struct CommandPos {
    // the log generation number
    gen: u64,
    // position of the command within the log (byte offset)
    pos: u64,
    // the total length of the command data
    len: u64,
}

impl CommandPos {
    fn new(gen: u64, pos: u64, len: u64) -> Self {
        CommandPos { gen, pos, len }
    }
}

impl From<(u64, Range<u64>)> for CommandPos {
    fn from((gen, range): (u64, Range<u64>)) -> Self {
        CommandPos {
            gen,
            pos: range.start,
            len: range.end - range.start,
        }
    }
}

/// returns the log generation numbers located in the given `dir`, sorted in ascending order.
/// Log files are expected to be named `{integer}.log`; other files are ignored.
///
/// # Errors
/// returns an IO Error if `dir` could not be read, or a Parsing error if a `.log` file
/// stem is not an integer
fn get_log_gens(dir: &Path) -> Result<Vec<u64>> {
    let mut logs: Vec<u64> = vec![];
    for entry in (fs::read_dir(dir)?).flatten() {
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().map_or(false, |ext| ext == "log") {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| ShelfError::Parsing(format!("could not read log file stem of {:?}", path)))?;
            let gen = stem.parse::<u64>().map_err(|_| {
                ShelfError::Parsing(format!("could not parse the file stem: {} into a u64", stem))
            })?;
            logs.push(gen);
        }
    }
    logs.sort_unstable();
    Ok(logs)
}

/// A struct that holds a BufferedReader along with the current seek `pos` of that BufferedReader
#[derive(Debug)]
struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> Result<Self> {
        let pos = inner.seek(SeekFrom::Current(0))?;
        Ok(BufReaderWithPos {
            reader: BufReader::new(inner),
            pos,
        })
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.reader.read(buf)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}

#[derive(Debug)]
struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    fn new(mut inner: W) -> Result<Self> {
        let pos = inner.seek(SeekFrom::Current(0))?;
        Ok(BufWriterWithPos {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.writer.write(buf)?;
        self.pos += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write + Seek> Seek for BufWriterWithPos<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.writer.seek(pos)?;
        Ok(self.pos)
    }
}
