//! # ArduPilot dataflash logs
//!
//! Decoder for the binary `.bin` logs ArduPilot writes to its onboard storage.
//! The logs are self-describing: `FMT` records declare the layout of every
//! other message type, and are interleaved with the data they describe.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ardulog_dataflash::Log;
//!
//! let data = std::fs::read("00000042.BIN")?;
//! let log = Log::parse(&data)?;
//!
//! for name in log.available_types() {
//!     println!("{name}: {} records", log.stats()[name].count);
//! }
//!
//! let altitude = log.get("BARO", "Alt")?;
//! let battery_1 = log.get_instance("BAT", 1, "Volt")?;
//! # Ok(())
//! # }
//! ```
//!
//! Damaged records (bad sync bytes, unknown type codes, malformed `FMT`
//! records, a truncated tail) are skipped and counted in the log's
//! [`Diagnostics`]. Parsing only fails if nothing could be decoded at all.

pub mod decoder;
pub mod format;
pub mod instance;
pub mod log;
pub mod options;
pub mod reader;
pub mod record;
pub mod registry;
pub mod summary;
pub mod time;
mod util;
pub mod value;
pub mod writer;

pub use crate::{
    decoder::{
        Decoder,
        Diagnostics,
        Records,
        records,
    },
    format::{
        Field,
        FieldType,
        FormatError,
        MessageLayout,
    },
    instance::InstanceKey,
    log::{
        Log,
        MessageStats,
        ParseError,
        QueryError,
        Table,
    },
    options::{
        MultiplierTable,
        ParseOptions,
    },
    reader::Reader,
    record::{
        RawRecord,
        Record,
    },
    summary::{
        Summary,
        VersionInfo,
    },
    value::{
        Column,
        Value,
    },
    writer::{
        EncodeError,
        LogWriter,
    },
};

#[derive(Debug, thiserror::Error)]
#[error("dataflash error")]
pub enum Error {
    Io(#[from] std::io::Error),
    Read(#[from] reader::Error),
    Parse(#[from] ParseError),
    Query(#[from] QueryError),
    Encode(#[from] EncodeError),
}
