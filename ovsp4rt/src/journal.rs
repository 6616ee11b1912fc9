/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! A record of every programming call, one JSON object per line.
//!
//! The journal is diagnostic.  Failing to write it is logged and otherwise ignored.  Records can
//! be read back with [`read_records`] and replayed through a dispatcher.

use serde::{Deserialize, Serialize};

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

use tracing::{event, Level};

use crate::events::Event;

/// Version of the record layout.
pub const RECORD_SCHEMA: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    pub insert_entry: bool,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub func_name: String,
    pub schema: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_name: Option<String>,
    pub params: Params,
}

impl Record {
    pub fn new(event: &Event, insert: bool) -> Self {
        Record {
            func_name: event.func_name().into(),
            schema: RECORD_SCHEMA,
            struct_name: event.struct_name().map(String::from),
            params: Params {
                insert_entry: insert,
                event: event.clone(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read journal")]
    Io(#[from] io::Error),

    #[error("line {line}: malformed record")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: unsupported record schema {schema}")]
    Schema { line: usize, schema: u32 },
}

/// Parses journal records from `input`, skipping blank lines.
pub fn read_records<R: BufRead>(input: R) -> impl Iterator<Item = Result<Record, RecordError>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
        .map(|(index, line)| {
            let line_number = index + 1;
            let record: Record = serde_json::from_str(&line?).map_err(|source| RecordError::Parse {
                line: line_number,
                source,
            })?;
            if record.schema != RECORD_SCHEMA {
                return Err(RecordError::Schema {
                    line: line_number,
                    schema: record.schema,
                });
            }
            Ok(record)
        })
}

pub struct Journal {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Journal {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Journal {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Appends to `path`, creating it if necessary.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Journal::new(file))
    }

    pub fn record(&self, event: &Event, insert: bool) {
        let record = Record::new(event, insert);
        let result = serde_json::to_string(&record)
            .map_err(io::Error::from)
            .and_then(|line| match self.out.lock() {
                Ok(mut out) => writeln!(out, "{}", line).and_then(|_| out.flush()),
                Err(_) => Err(io::Error::new(io::ErrorKind::Other, "journal lock poisoned")),
            });
        if let Err(e) = result {
            event!(Level::WARN, "{}: failed to write journal record: {}", record.func_name, e);
        }
    }
}
