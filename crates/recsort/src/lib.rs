//! DFSORT-style record sort/merge engine.
//!
//! This crate sorts, merges, filters, reformats and aggregates raw byte
//! records under the control of mainframe-style control statements. Records
//! are never deserialized: typed accessors decode only the fields that the
//! statements name.
//!
//! # Features
//!
//! - SORT and MERGE with multiple keys (CH, SS, ZD, PD, FI, BI)
//! - INCLUDE/OMIT record filtering
//! - INREC/OUTREC reformatting with edit masks
//! - SUM of numeric fields, or removal of duplicate keys
//! - OUTFIL fan-out to several destinations
//! - External sort with parallel spill when input exceeds the memory limit
//!
//! # Example
//!
//! ```no_run
//! use recsort::{SortConfig, SortInput, Sorter};
//!
//! let sorter = Sorter::from_cards(
//!     " SORT FIELDS=(1,10,CH,A)\n INCLUDE COND=(20,2,CH,EQ,C'NY')",
//!     SortConfig::default(),
//! )?;
//! let inputs = [SortInput::file("input.dat")];
//! let mut out = std::fs::File::create("output.dat")?;
//! let stats = sorter.sort(&inputs, &mut [&mut out])?;
//! println!("{} records written", stats.output_records);
//! # Ok::<(), recsort::SortError>(())
//! ```

pub mod accessor;
mod cards;
pub mod comparer;
mod config;
pub mod encoding;
mod engine;
mod error;
pub mod filter;
pub mod formatter;
pub mod lexer;
mod outfil;
mod record;
mod sum;

pub use accessor::{Accessor, FieldAccessor, FieldFormat};
pub use cards::{parse_control_statements, ControlStatements, Mode};
pub use comparer::{Comparer, Direction, SortKey};
pub use config::{SortConfig, DEFAULT_MEMORY_LIMIT};
pub use encoding::{Collation, Encoding};
pub use engine::{SortStats, Sorter, Strategy};
pub use error::{Result, SortError};
pub use filter::{CompareOp, Condition, Filter};
pub use formatter::{Edit, EditMask, Formatter};
pub use outfil::{parse_outfil, OutputSpec};
pub use record::{RecordFormat, RecordReader, RecordWriter, SortInput};
pub use sum::{SumAggregator, SumSpec};
