//! Input scanning: framing, header skip, filters, INREC and validation.

use std::io::Read;
use std::slice;

use crate::error::Result;
use crate::filter::Filter;
use crate::record::{RecordReader, SortInput};

use super::Sorter;

/// Streams the records of a list of inputs through the scan stage.
///
/// Header records are skipped at the start of every input; those of the
/// first input are kept for the outputs.
pub(crate) struct Scanner<'a> {
    sorter: &'a Sorter,
    pass_filter: Option<&'a Filter>,
    inputs: slice::Iter<'a, SortInput>,
    reader: Option<RecordReader<Box<dyn Read + 'a>>>,
    header: Vec<Vec<u8>>,
    read: u64,
    filtered: u64,
}

impl<'a> Scanner<'a> {
    /// Opens the first input and reads its header records.
    pub(crate) fn new(
        sorter: &'a Sorter,
        inputs: &'a [SortInput],
        pass_filter: Option<&'a Filter>,
    ) -> Result<Self> {
        let mut scanner = Self {
            sorter,
            pass_filter,
            inputs: inputs.iter(),
            reader: None,
            header: Vec::new(),
            read: 0,
            filtered: 0,
        };
        scanner.open_next(true)?;
        Ok(scanner)
    }

    /// Header records of the first input.
    pub(crate) fn take_header(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.header)
    }

    /// Data records read so far, header records excluded.
    pub(crate) fn records_read(&self) -> u64 {
        self.read
    }

    /// Records dropped by INCLUDE/OMIT.
    pub(crate) fn records_filtered(&self) -> u64 {
        self.filtered
    }

    fn open_next(&mut self, keep_header: bool) -> Result<()> {
        self.reader = None;
        let Some(input) = self.inputs.next() else {
            return Ok(());
        };
        let config = &self.sorter.config;
        let mut reader = RecordReader::new(input.open()?, &config.record_format);
        for _ in 0..config.header_records {
            match reader.read_record()? {
                Some(record) if keep_header => self.header.push(record),
                Some(_) => {}
                None => break,
            }
        }
        self.reader = Some(reader);
        Ok(())
    }

    /// Returns the next record that survives the scan stage.
    pub(crate) fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            let Some(record) = reader
                .read_record()
                .map_err(|e| e.at_record(self.read + 1))?
            else {
                self.open_next(false)?;
                continue;
            };
            self.read += 1;
            let number = self.read;

            if let Some(record) = self.process(record).map_err(|e| e.at_record(number))? {
                return Ok(Some(record));
            }
        }
    }

    fn process(&mut self, record: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let sorter = self.sorter;
        if let Some(filter) = &sorter.filter {
            if !filter.evaluate(&record)? {
                self.filtered += 1;
                return Ok(None);
            }
        }
        if let Some(filter) = self.pass_filter {
            if !filter.evaluate(&record)? {
                return Ok(None);
            }
        }

        let record = match &sorter.inrec {
            Some(inrec) => inrec.format(&record)?,
            None => record,
        };

        if let Some(comparer) = sorter.active_comparer() {
            comparer.validate(&record)?;
            if let Some(sum) = &sorter.sum {
                sum.validate(&record)?;
            }
        }
        if let Some(outrec) = &sorter.outrec {
            outrec.validate(&record)?;
        }
        Ok(Some(record))
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
