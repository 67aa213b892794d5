//! Sort engine.
//!
//! A [`Sorter`] holds compiled pipeline objects and runs them over a list
//! of inputs. Each call to [`Sorter::sort`] picks one strategy:
//!
//! - **copy**: no keys, records keep arrival order
//! - **merge**: every input is already sorted; heads are merged directly
//! - **in-memory**: total input fits `memory_limit`; one `Vec` is sorted
//! - **external**: sorted chunks are spilled in parallel, then merged
//!
//! With OUTFIL destinations the whole pipeline runs once per destination.

use std::fmt;
use std::io::Write;

use tracing::{debug, info, warn};

use crate::cards::{parse_control_statements, ControlStatements, Mode};
use crate::comparer::Comparer;
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::filter::Filter;
use crate::formatter::Formatter;
use crate::outfil::OutputSpec;
use crate::record::SortInput;
use crate::sum::SumSpec;

mod external;
mod scan;
mod sink;

use external::{merge_runs, ExternalSort, RunSource};
use scan::Scanner;
use sink::{Sink, SinkStats};

/// How a pass ordered its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Copy,
    Merge,
    InMemory,
    External,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Copy => "copy",
            Strategy::Merge => "merge",
            Strategy::InMemory => "in-memory",
            Strategy::External => "external",
        };
        f.write_str(name)
    }
}

/// Statistics from a sort operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Strategy of the first pass.
    pub strategy: Strategy,
    /// Data records read by the first pass, header records excluded.
    pub input_records: u64,
    /// Records dropped by INCLUDE/OMIT in the first pass.
    pub filtered_records: u64,
    /// Records folded into another by SUM, over all passes.
    pub summed_records: u64,
    /// Records written, over all destinations.
    pub output_records: u64,
    /// Records written to each destination, in order.
    pub per_destination: Vec<u64>,
    /// Spill files written, over all passes.
    pub spill_files: usize,
}

/// Compiled sort job.
#[derive(Debug, Clone)]
pub struct Sorter {
    config: SortConfig,
    mode: Mode,
    comparer: Option<Comparer>,
    filter: Option<Filter>,
    inrec: Option<Formatter>,
    outrec: Option<Formatter>,
    sum: Option<SumSpec>,
    outputs: Vec<OutputSpec>,
}

impl Sorter {
    /// A sorter that copies records unchanged.
    pub fn new(config: SortConfig) -> Self {
        Self {
            config,
            mode: Mode::Sort,
            comparer: None,
            filter: None,
            inrec: None,
            outrec: None,
            sum: None,
            outputs: Vec::new(),
        }
    }

    /// Builds a sorter from compiled control statements.
    ///
    /// `OPTION EQUALS`/`NOEQUALS` override `config.stable`.
    pub fn from_control_statements(statements: ControlStatements, config: SortConfig) -> Self {
        let config = match statements.stable {
            Some(stable) => config.with_stable(stable),
            None => config,
        };
        Self {
            config,
            mode: statements.mode,
            comparer: statements.comparer,
            filter: statements.filter,
            inrec: statements.inrec,
            outrec: statements.outrec,
            sum: statements.sum,
            outputs: statements.outputs,
        }
    }

    /// Parses a control statement deck and builds a sorter from it.
    pub fn from_cards(cards: &str, config: SortConfig) -> Result<Self> {
        config.validate()?;
        let statements = parse_control_statements(cards, &config)?;
        Ok(Self::from_control_statements(statements, config))
    }

    #[must_use]
    pub fn with_comparer(mut self, comparer: Comparer) -> Self {
        self.comparer = Some(comparer);
        self
    }

    /// Sort (the default) or merge. `Mode::Copy` ignores the comparer.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_inrec(mut self, formatter: Formatter) -> Self {
        self.inrec = Some(formatter);
        self
    }

    #[must_use]
    pub fn with_outrec(mut self, formatter: Formatter) -> Self {
        self.outrec = Some(formatter);
        self
    }

    #[must_use]
    pub fn with_sum(mut self, sum: SumSpec) -> Self {
        self.sum = Some(sum);
        self
    }

    /// Adds an OUTFIL destination.
    #[must_use]
    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn comparer(&self) -> Option<&Comparer> {
        self.active_comparer()
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Number of output sinks [`Sorter::sort`] expects.
    pub fn destination_count(&self) -> usize {
        self.outputs.len().max(1)
    }

    fn active_comparer(&self) -> Option<&Comparer> {
        match self.mode {
            Mode::Copy => None,
            Mode::Sort | Mode::Merge => self.comparer.as_ref(),
        }
    }

    /// Runs the job over `inputs`, writing one sink per destination.
    ///
    /// With no OUTFIL destinations exactly one sink is expected.
    pub fn sort(&self, inputs: &[SortInput], outputs: &mut [&mut dyn Write]) -> Result<SortStats> {
        self.config.validate()?;
        let expected = self.destination_count();
        if outputs.len() != expected {
            return Err(SortError::DestinationMismatch {
                expected,
                actual: outputs.len(),
            });
        }
        if self.mode == Mode::Merge && self.comparer.is_none() {
            return Err(SortError::Config {
                detail: "MERGE needs key fields".to_string(),
            });
        }
        if self.sum.is_some() && self.active_comparer().is_none() {
            warn!("SUM ignored: no sort keys are active");
        }

        let mut stats = SortStats::default();
        if self.outputs.is_empty() {
            let out = &mut *outputs[0];
            self.run_pass(inputs, None, out, &mut stats)?;
        } else {
            for (index, (spec, out)) in self.outputs.iter().zip(outputs.iter_mut()).enumerate() {
                debug!(destination = %spec.label(index), "starting destination pass");
                self.run_pass(inputs, Some(spec), &mut **out, &mut stats)?;
            }
        }

        info!(
            strategy = %stats.strategy,
            input_records = stats.input_records,
            filtered_records = stats.filtered_records,
            summed_records = stats.summed_records,
            output_records = stats.output_records,
            spill_files = stats.spill_files,
            "sort complete"
        );
        Ok(stats)
    }

    /// One complete scan, order and sink pass for one destination.
    fn run_pass(
        &self,
        inputs: &[SortInput],
        destination: Option<&OutputSpec>,
        out: &mut dyn Write,
        stats: &mut SortStats,
    ) -> Result<()> {
        let first_pass = stats.per_destination.is_empty();
        let pass_filter = destination.and_then(|d| d.filter.as_ref());
        let layout = destination.and_then(|d| d.formatter.as_ref());

        let (strategy, scanned, sink_stats) = match self.active_comparer() {
            None => {
                let mut scanner = Scanner::new(self, inputs, pass_filter)?;
                let mut sink = Sink::new(self, layout, out, &scanner.take_header())?;
                for record in scanner.by_ref() {
                    sink.push(record?)?;
                }
                (Strategy::Copy, counts(&scanner), sink.finish()?)
            }
            Some(comparer) if self.mode == Mode::Merge => {
                self.merge_pass(comparer, inputs, pass_filter, layout, out)?
            }
            Some(comparer) => {
                let total = inputs
                    .iter()
                    .map(SortInput::byte_len)
                    .sum::<Result<u64>>()?;
                let mut scanner = Scanner::new(self, inputs, pass_filter)?;
                let header = scanner.take_header();

                if total <= self.config.memory_limit {
                    if first_pass {
                        info!(
                            input_bytes = total,
                            memory_limit = self.config.memory_limit,
                            "using in-memory sort"
                        );
                    }
                    let mut records = scanner.by_ref().collect::<Result<Vec<_>>>()?;
                    if self.config.stable {
                        records.sort_by(|a, b| comparer.compare(a, b));
                    } else {
                        records.sort_unstable_by(|a, b| comparer.compare(a, b));
                    }
                    let mut sink = Sink::new(self, layout, out, &header)?;
                    for record in records {
                        sink.push(record)?;
                    }
                    (Strategy::InMemory, counts(&scanner), sink.finish()?)
                } else {
                    if first_pass {
                        info!(
                            input_bytes = total,
                            memory_limit = self.config.memory_limit,
                            "using external sort"
                        );
                    }
                    let external = ExternalSort {
                        comparer,
                        stable: self.config.stable,
                        memory_limit: self.config.memory_limit,
                        workers: self.config.workers,
                        temp_dir: self.config.temp_dir.as_deref(),
                    };
                    let runs = external.spill(scanner.by_ref())?;
                    debug!(runs = runs.len(), dir = %runs.dir().display(), "merging spilled runs");
                    stats.spill_files += runs.len();

                    let mut sink = Sink::new(self, layout, out, &header)?;
                    merge_runs(runs.open()?, comparer, |record| sink.push(record))?;
                    (Strategy::External, counts(&scanner), sink.finish()?)
                }
            }
        };

        if first_pass {
            stats.strategy = strategy;
            stats.input_records = scanned.0;
            stats.filtered_records = scanned.1;
        }
        stats.summed_records += sink_stats.summed;
        stats.output_records += sink_stats.written;
        stats.per_destination.push(sink_stats.written);
        Ok(())
    }

    /// Treats each input as a sorted run and merges the runs.
    fn merge_pass(
        &self,
        comparer: &Comparer,
        inputs: &[SortInput],
        pass_filter: Option<&Filter>,
        layout: Option<&Formatter>,
        out: &mut dyn Write,
    ) -> Result<(Strategy, (u64, u64), SinkStats)> {
        let mut scanners = inputs
            .iter()
            .map(|input| Scanner::new(self, std::slice::from_ref(input), pass_filter))
            .collect::<Result<Vec<_>>>()?;
        let header = scanners
            .first_mut()
            .map(Scanner::take_header)
            .unwrap_or_default();

        let mut sink = Sink::new(self, layout, out, &header)?;
        {
            let sources = scanners
                .iter_mut()
                .map(|s| Box::new(s) as Box<dyn RunSource + '_>)
                .collect();
            merge_runs(sources, comparer, |record| sink.push(record))?;
        }

        let scanned = scanners
            .iter()
            .map(counts)
            .fold((0, 0), |acc, c| (acc.0 + c.0, acc.1 + c.1));
        Ok((Strategy::Merge, scanned, sink.finish()?))
    }
}

fn counts(scanner: &Scanner<'_>) -> (u64, u64) {
    (scanner.records_read(), scanner.records_filtered())
}
