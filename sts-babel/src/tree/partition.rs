//! Partitions and the intermediate tree file.
//!
//! The intermediate form is one JSON document:
//!
//! ```text
//! {"header": {"resource_dir": "...", "document_id": "..."},
//!  "partitions": [
//!    {"sub_part_id": "front", "continued": false, "root": {...}},
//!    ...
//!  ]}
//! ```
//!
//! [`PartitionWriter`] appends one partition at a time and [`replay`] hands
//! them to a sink one at a time, so neither side holds the whole document.

use super::Node;
use crate::error::{ConvertError, Result};
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// A self-contained subtree emitted by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub sub_part_id: String,
    /// The root continues a partition whose head was emitted earlier (content
    /// following a nested partition).
    #[serde(default)]
    pub continued: bool,
    pub root: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHeader {
    /// Directory that relative resource references (graphics) resolve against.
    pub resource_dir: String,
    pub document_id: String,
}

/// Consumer of builder output.
pub trait PartitionSink {
    fn begin(&mut self, _header: &TreeHeader) -> Result<()> {
        Ok(())
    }

    fn accept(&mut self, partition: Partition) -> Result<()>;
}

impl PartitionSink for Vec<Partition> {
    fn accept(&mut self, partition: Partition) -> Result<()> {
        self.push(partition);
        Ok(())
    }
}

/// Drops every partition. Used when only the store side effects matter.
#[derive(Debug, Default)]
pub struct Discard;

impl PartitionSink for Discard {
    fn accept(&mut self, _partition: Partition) -> Result<()> {
        Ok(())
    }
}

/// Streams partitions into the intermediate JSON document.
#[derive(Debug)]
pub struct PartitionWriter<W: Write> {
    out: W,
    written: usize,
    started: bool,
}

impl<W: Write> PartitionWriter<W> {
    pub fn new(out: W) -> Self {
        PartitionWriter {
            out,
            written: 0,
            started: false,
        }
    }

    /// Close the document and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        if !self.started {
            self.begin(&TreeHeader::default())?;
        }
        self.out.write_all(b"\n]}\n")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> PartitionSink for PartitionWriter<W> {
    fn begin(&mut self, header: &TreeHeader) -> Result<()> {
        self.out.write_all(b"{\"header\":")?;
        serde_json::to_writer(&mut self.out, header)?;
        self.out.write_all(b",\"partitions\":[")?;
        self.started = true;
        Ok(())
    }

    fn accept(&mut self, partition: Partition) -> Result<()> {
        if !self.started {
            self.begin(&TreeHeader::default())?;
        }
        if self.written > 0 {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\n")?;
        serde_json::to_writer(&mut self.out, &partition)?;
        self.written += 1;
        Ok(())
    }
}

/// Read an intermediate tree and feed its partitions to `sink` in order.
/// Returns the header.
pub fn replay<R: Read, S: PartitionSink + ?Sized>(reader: R, sink: &mut S) -> Result<TreeHeader> {
    let mut failure = None;
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let seed = TreeSeed {
        sink,
        failure: &mut failure,
    };
    match seed.deserialize(&mut deserializer) {
        Ok(header) => {
            deserializer.end()?;
            Ok(header)
        }
        // A sink error surfaces as a serde error; report the original.
        Err(err) => Err(failure.unwrap_or(ConvertError::Tree(err))),
    }
}

struct TreeSeed<'a, 'f, S: ?Sized> {
    sink: &'a mut S,
    failure: &'f mut Option<ConvertError>,
}

impl<'de, S: PartitionSink + ?Sized> DeserializeSeed<'de> for TreeSeed<'_, '_, S> {
    type Value = TreeHeader;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<TreeHeader, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: PartitionSink + ?Sized> Visitor<'de> for TreeSeed<'_, '_, S> {
    type Value = TreeHeader;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an intermediate tree document")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TreeHeader, A::Error> {
        let TreeSeed { sink, failure } = self;
        let mut header = None;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "header" => {
                    let value: TreeHeader = map.next_value()?;
                    sink.begin(&value).map_err(|err| fail(failure, err))?;
                    header = Some(value);
                }
                "partitions" => {
                    if header.is_none() {
                        return Err(de::Error::custom("partitions before header"));
                    }
                    map.next_value_seed(PartitionsSeed {
                        sink: &mut *sink,
                        failure: &mut *failure,
                    })?;
                }
                _ => {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
        }
        header.ok_or_else(|| de::Error::missing_field("header"))
    }
}

struct PartitionsSeed<'a, 'f, S: ?Sized> {
    sink: &'a mut S,
    failure: &'f mut Option<ConvertError>,
}

impl<'de, S: PartitionSink + ?Sized> DeserializeSeed<'de> for PartitionsSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, S: PartitionSink + ?Sized> Visitor<'de> for PartitionsSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a sequence of partitions")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let PartitionsSeed { sink, failure } = self;
        while let Some(partition) = seq.next_element::<Partition>()? {
            sink.accept(partition).map_err(|err| fail(failure, err))?;
        }
        Ok(())
    }
}

fn fail<E: de::Error>(slot: &mut Option<ConvertError>, err: ConvertError) -> E {
    let message = err.to_string();
    *slot = Some(err);
    E::custom(message)
}
