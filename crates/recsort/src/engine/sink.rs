//! Output stage: SUM, OUTREC, destination layout and record framing.

use std::io::Write;

use crate::error::{Result, SortError};
use crate::formatter::Formatter;
use crate::record::RecordWriter;
use crate::sum::SumAggregator;

use super::Sorter;

/// Counters for one destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SinkStats {
    pub written: u64,
    pub summed: u64,
    pub overflows: u64,
}

/// Receives records in final order and writes them to one output.
pub(crate) struct Sink<'a, W: Write> {
    writer: RecordWriter<W>,
    sum: Option<SumAggregator<'a>>,
    outrec: Option<&'a Formatter>,
    layout: Option<&'a Formatter>,
    written: u64,
}

impl<'a, W: Write> Sink<'a, W> {
    /// Creates a sink and writes the header records.
    pub(crate) fn new(
        sorter: &'a Sorter,
        layout: Option<&'a Formatter>,
        out: W,
        header: &[Vec<u8>],
    ) -> Result<Self> {
        let mut writer = RecordWriter::new(out, &sorter.config.record_format);
        for record in header {
            writer.write_record(record)?;
        }
        let sum = match (&sorter.sum, sorter.active_comparer()) {
            (Some(spec), Some(comparer)) => Some(SumAggregator::new(spec, comparer)),
            _ => None,
        };
        Ok(Self {
            writer,
            sum,
            outrec: sorter.outrec.as_ref(),
            layout,
            written: 0,
        })
    }

    pub(crate) fn push(&mut self, record: Vec<u8>) -> Result<()> {
        let ready = match self.sum.as_mut() {
            Some(sum) => sum.push(record)?,
            None => Some(record),
        };
        match ready {
            Some(record) => self.emit(record),
            None => Ok(()),
        }
    }

    /// Flushes the pending SUM record and the writer.
    pub(crate) fn finish(mut self) -> Result<SinkStats> {
        let (summed, overflows) = match self.sum.take() {
            Some(mut sum) => {
                if let Some(record) = sum.finish() {
                    self.emit(record)?;
                }
                (sum.summed(), sum.overflows())
            }
            None => (0, 0),
        };
        self.writer.flush()?;
        Ok(SinkStats {
            written: self.written,
            summed,
            overflows,
        })
    }

    /// Output errors carry the 1-based output record number.
    fn emit(&mut self, record: Vec<u8>) -> Result<()> {
        let number = self.written + 1;
        let stamp = move |e: SortError| e.at_record(number);
        let record = match self.outrec {
            Some(outrec) => outrec.format(&record).map_err(stamp)?,
            None => record,
        };
        let record = match self.layout {
            Some(layout) => layout.format(&record).map_err(stamp)?,
            None => record,
        };
        self.writer.write_record(&record)?;
        self.written += 1;
        Ok(())
    }
}
