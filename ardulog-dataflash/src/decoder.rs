//! Stream decoder
//!
//! Frames records from a byte buffer. Damage in the input never stops
//! decoding: the decoder skips a byte and looks for the next header, while
//! counting what it skipped in [`Diagnostics`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    format::{
        HEADER_LENGTH,
        HEADER_MAGIC,
    },
    options::ParseOptions,
    record::RawRecord,
    registry::Registry,
};

/// What went wrong while decoding, without failing the parse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Total number of input bytes.
    pub num_bytes: u64,

    /// Number of framed records, including `FMT` records.
    pub num_records: u64,

    /// Bytes skipped while searching for a header.
    pub skipped_bytes: u64,

    /// Headers with a type code that has no layout, by type code.
    pub unknown_types: BTreeMap<u8, u64>,

    /// `FMT` records that were framed but not registered.
    pub rejected_formats: u64,

    /// Bytes at the end of the input that didn't form a complete record.
    pub truncated_bytes: u64,
}

impl Diagnostics {
    /// Whether the input decoded without skipping or dropping anything.
    pub fn is_clean(&self) -> bool {
        self.skipped_bytes == 0
            && self.unknown_types.is_empty()
            && self.rejected_formats == 0
            && self.truncated_bytes == 0
    }
}

/// Result of [`Decoder::decode_next`].
#[derive(Debug)]
pub enum Frame<'a> {
    Record {
        record: RawRecord<'a>,
        consumed: usize,
    },

    /// More data is needed to frame the next record. `consumed` bytes before
    /// that were skipped.
    Incomplete { consumed: usize },
}

#[derive(Clone, Debug)]
pub struct Decoder {
    registry: Registry,
    position: u64,
    diagnostics: Diagnostics,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(&ParseOptions::default())
    }
}

impl Decoder {
    pub fn new(options: &ParseOptions) -> Self {
        Self {
            registry: Registry::new(options),
            position: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Input offset of the next byte the decoder will look at.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Frames the next record from `data`.
    ///
    /// `data` must start at [`position`][Self::position]. Unframeable bytes
    /// are skipped. Records that define or annotate layouts are applied to the
    /// registry before they're returned.
    pub fn decode_next<'a>(&mut self, data: &'a [u8]) -> Frame<'a> {
        let mut pos = 0;

        loop {
            let remaining = &data[pos..];
            if remaining.len() < HEADER_LENGTH {
                return self.incomplete(pos);
            }

            if remaining[..2] != HEADER_MAGIC {
                pos += 1;
                self.diagnostics.skipped_bytes += 1;
                continue;
            }

            let type_code = remaining[2];
            let Some(layout) = self.registry.resolve(type_code)
            else {
                tracing::trace!(
                    offset = self.position + pos as u64,
                    type_code,
                    "unknown type code"
                );
                *self
                    .diagnostics
                    .unknown_types
                    .entry(type_code)
                    .or_default() += 1;
                pos += 1;
                self.diagnostics.skipped_bytes += 1;
                continue;
            };

            let length = layout.length();
            if remaining.len() < length {
                return self.incomplete(pos);
            }

            let layout = layout.clone();
            let payload = &remaining[HEADER_LENGTH..length];
            let offset = self.position + pos as u64;

            if let Err(error) = self.registry.observe(&layout, payload) {
                tracing::debug!(offset, ?error, "rejected format record");
                self.diagnostics.rejected_formats += 1;
            }

            let consumed = pos + length;
            self.position += consumed as u64;
            self.diagnostics.num_records += 1;

            return Frame::Record {
                record: RawRecord {
                    layout,
                    offset,
                    payload,
                },
                consumed,
            };
        }
    }

    fn incomplete(&mut self, consumed: usize) -> Frame<'static> {
        self.position += consumed as u64;
        Frame::Incomplete { consumed }
    }

    /// Ends decoding. `remaining` is the number of bytes that were left over
    /// after the last record.
    pub fn finish(&mut self, remaining: usize) -> Diagnostics {
        if remaining > 0 {
            tracing::debug!(remaining, "truncated record at end of input");
        }
        self.diagnostics.truncated_bytes += remaining as u64;
        self.diagnostics.num_bytes = self.position + remaining as u64;
        self.diagnostics.clone()
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

/// Iterates over the records in a complete buffer.
#[derive(Debug)]
pub struct Records<'a> {
    decoder: Decoder,
    data: &'a [u8],
    pos: usize,
    finished: bool,
}

impl<'a> Records<'a> {
    pub fn new(data: &'a [u8], options: &ParseOptions) -> Self {
        Self {
            decoder: Decoder::new(options),
            data,
            pos: 0,
            finished: false,
        }
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Returns the decoder, e.g. to get the [`Diagnostics`] after iterating.
    ///
    /// If the iterator wasn't exhausted, the rest of the input is counted as
    /// truncated.
    pub fn into_decoder(mut self) -> Decoder {
        if !self.finished {
            self.decoder.finish(self.data.len() - self.pos);
        }
        self.decoder
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let data = self.data;
        match self.decoder.decode_next(&data[self.pos..]) {
            Frame::Record { record, consumed } => {
                self.pos += consumed;
                Some(record)
            }
            Frame::Incomplete { consumed } => {
                self.pos += consumed;
                self.decoder.finish(self.data.len() - self.pos);
                self.finished = true;
                None
            }
        }
    }
}

/// Iterates over the records in `data` without decoding their fields.
pub fn records<'a>(data: &'a [u8], options: &ParseOptions) -> Records<'a> {
    Records::new(data, options)
}

#[cfg(test)]
mod tests {
    use crate::{
        decoder::{
            Decoder,
            Frame,
            records,
        },
        format::FMT_TYPE,
        options::ParseOptions,
        writer::LogWriter,
    };

    fn test_log() -> Vec<u8> {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x81, "TST", "Qf", "TimeUS,Value")
            .unwrap();
        writer.write_raw(0x81, &[0; 12]).unwrap();
        writer.into_bytes()
    }

    #[test]
    fn it_frames_records() {
        let data = test_log();
        let mut records = records(&data, &ParseOptions::default());
        assert_eq!(records.next().unwrap().layout().type_code(), FMT_TYPE);
        let record = records.next().unwrap();
        assert_eq!(record.name(), "TST");
        assert_eq!(record.offset(), 89);
        assert!(records.next().is_none());

        let diagnostics = records.into_decoder().into_diagnostics();
        assert_eq!(diagnostics.num_records, 2);
        assert_eq!(diagnostics.num_bytes, 89 + 15);
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn it_skips_garbage() {
        let mut data = vec![0x00, 0xa3, 0x42];
        data.extend_from_slice(&test_log());
        let names = records(&data, &ParseOptions::default())
            .map(|record| record.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["FMT", "TST"]);
    }

    #[test]
    fn it_counts_unknown_types() {
        let mut data = test_log();
        data.extend_from_slice(&[0xa3, 0x95, 0x99, 0x01, 0x02]);
        data.extend_from_slice(&test_log()[89..]);

        let mut records = records(&data, &ParseOptions::default());
        assert_eq!(records.by_ref().count(), 3);
        let diagnostics = records.into_decoder().into_diagnostics();
        assert_eq!(diagnostics.unknown_types.get(&0x99), Some(&1));
        assert_eq!(diagnostics.skipped_bytes, 5);
    }

    #[test]
    fn it_reports_incomplete_records() {
        let data = test_log();
        let mut decoder = Decoder::default();

        let Frame::Record { consumed, .. } = decoder.decode_next(&data)
        else {
            panic!("expected a record");
        };
        assert!(matches!(
            decoder.decode_next(&data[consumed..data.len() - 1]),
            Frame::Incomplete { consumed: 0 }
        ));

        let diagnostics = decoder.finish(14);
        assert_eq!(diagnostics.truncated_bytes, 14);
        assert_eq!(diagnostics.num_bytes, 89 + 14);
    }
}
