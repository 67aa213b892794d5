//! External sort: parallel spill of sorted chunks, then a k-way merge.
//!
//! Chunks are cut in input order and spilled a batch at a time on a rayon
//! pool, one job per chunk. Each spill file holds `u32` little-endian
//! length-prefixed records. The merge pops the smallest head record from
//! a min-heap, breaking ties by run index so equal keys keep input order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::comparer::Comparer;
use crate::error::{Result, SortError};

/// A sorted stream of records feeding the merge.
pub(crate) trait RunSource {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>>;
}

impl<I> RunSource for I
where
    I: Iterator<Item = Result<Vec<u8>>>,
{
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        self.next().transpose()
    }
}

/// Reader over one spill file.
struct SpillReader {
    inner: BufReader<File>,
}

impl SpillReader {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: BufReader::new(File::open(path)?),
        })
    }

    fn read(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.inner.read(&mut len_buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("spill run ends inside a length prefix ({filled} of 4 bytes)"),
                    )
                    .into())
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut record = vec![0u8; len];
        self.inner.read_exact(&mut record)?;
        Ok(Some(record))
    }
}

impl Iterator for SpillReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Settings for one external sort.
pub(crate) struct ExternalSort<'a> {
    pub comparer: &'a Comparer,
    pub stable: bool,
    pub memory_limit: u64,
    pub workers: usize,
    pub temp_dir: Option<&'a Path>,
}

/// Sorted spill runs in a temporary directory, removed on drop.
pub(crate) struct SpilledRuns {
    dir: TempDir,
    paths: Vec<PathBuf>,
}

impl SpilledRuns {
    pub(crate) fn len(&self) -> usize {
        self.paths.len()
    }

    /// Opens every run, in creation order.
    pub(crate) fn open(&self) -> Result<Vec<Box<dyn RunSource>>> {
        self.paths
            .iter()
            .map(|path| Ok(Box::new(SpillReader::open(path)?) as Box<dyn RunSource>))
            .collect()
    }

    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl ExternalSort<'_> {
    /// Records per chunk for a given first-record length.
    pub(crate) fn records_per_chunk(&self, workers: usize, first_len: usize) -> usize {
        let per_worker = self.memory_limit / workers.max(1) as u64;
        let per_record = 4 + first_len as u64;
        usize::try_from(per_worker / per_record)
            .unwrap_or(usize::MAX)
            .max(1)
    }

    /// Reads all `records`, writing sorted runs to a fresh temp directory.
    pub(crate) fn spill<I>(&self, mut records: I) -> Result<SpilledRuns>
    where
        I: Iterator<Item = Result<Vec<u8>>>,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("recsort-spill-{i}"))
            .build()
            .map_err(|e| SortError::Config {
                detail: format!("cannot start spill workers: {e}"),
            })?;
        let workers = pool.current_num_threads();

        let dir = match self.temp_dir {
            Some(parent) => tempfile::Builder::new().prefix("recsort-").tempdir_in(parent)?,
            None => tempfile::Builder::new().prefix("recsort-").tempdir()?,
        };
        let mut runs = SpilledRuns {
            dir,
            paths: Vec::new(),
        };

        let Some(first) = records.next().transpose()? else {
            return Ok(runs);
        };
        let chunk_len = self.records_per_chunk(workers, first.len());
        info!(workers, records_per_chunk = chunk_len, "external sort chunking");

        let mut chunk = Vec::with_capacity(chunk_len.min(1 << 16));
        chunk.push(first);
        let mut batch: Vec<Vec<Vec<u8>>> = Vec::with_capacity(workers);
        for record in records {
            chunk.push(record?);
            if chunk.len() >= chunk_len {
                batch.push(std::mem::take(&mut chunk));
                if batch.len() >= workers {
                    self.spill_batch(&pool, std::mem::take(&mut batch), &mut runs)?;
                }
            }
        }
        if !chunk.is_empty() {
            batch.push(chunk);
        }
        if !batch.is_empty() {
            self.spill_batch(&pool, batch, &mut runs)?;
        }
        Ok(runs)
    }

    /// Sorts and writes each chunk of `batch` in parallel.
    fn spill_batch(
        &self,
        pool: &rayon::ThreadPool,
        batch: Vec<Vec<Vec<u8>>>,
        runs: &mut SpilledRuns,
    ) -> Result<()> {
        let base = runs.paths.len();
        let dir = runs.dir.path();
        let comparer = self.comparer;
        let stable = self.stable;

        let written: Vec<PathBuf> = pool.install(|| {
            batch
                .into_par_iter()
                .enumerate()
                .map(|(i, mut chunk)| {
                    if stable {
                        chunk.sort_by(|a, b| comparer.compare(a, b));
                    } else {
                        chunk.sort_unstable_by(|a, b| comparer.compare(a, b));
                    }
                    let path = dir.join(format!("run-{:05}.tmp", base + i));
                    write_run(&path, &chunk)?;
                    debug!(run = base + i, records = chunk.len(), "spilled sorted run");
                    Ok(path)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        runs.paths.extend(written);
        Ok(())
    }
}

fn write_run(path: &Path, records: &[Vec<u8>]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        let len = u32::try_from(record.len()).map_err(|_| SortError::Config {
            detail: format!("record of {} bytes is too long to spill", record.len()),
        })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Entry in the merge heap.
///
/// `BinaryHeap` is a max-heap, so the ordering is reversed.
struct HeapEntry<'a> {
    record: Vec<u8>,
    run: usize,
    comparer: &'a Comparer,
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparer
            .compare(&other.record, &self.record)
            .then_with(|| other.run.cmp(&self.run))
    }
}

/// Merges sorted runs into `emit` in comparer order.
///
/// On equal keys the run with the lower index goes first.
pub(crate) fn merge_runs<F>(
    mut sources: Vec<Box<dyn RunSource + '_>>,
    comparer: &Comparer,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(Vec<u8>) -> Result<()>,
{
    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (run, source) in sources.iter_mut().enumerate() {
        if let Some(record) = source.next_record()? {
            heap.push(HeapEntry {
                record,
                run,
                comparer,
            });
        }
    }

    while let Some(HeapEntry { record, run, .. }) = heap.pop() {
        if let Some(next) = sources[run].next_record()? {
            heap.push(HeapEntry {
                record: next,
                run,
                comparer,
            });
        }
        emit(record)?;
    }
    Ok(())
}
