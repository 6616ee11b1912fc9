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

use proto::p4runtime::Uint128;

use std::fmt::{self, Display};
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A 128-bit P4Runtime election id.  The switch grants mastership to the
/// highest id it has seen, compared as `(high, low)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElectionId {
    pub high: u64,
    pub low: u64,
}

impl ElectionId {
    pub fn new(high: u64, low: u64) -> Self {
        ElectionId { high, low }
    }

    pub fn to_proto(self) -> Uint128 {
        let mut uint128 = Uint128::new();
        uint128.set_high(self.high);
        uint128.set_low(self.low);
        uint128
    }
}

impl From<u128> for ElectionId {
    fn from(x: u128) -> Self {
        ElectionId {
            high: (x >> 64) as u64,
            low: x as u64,
        }
    }
}

impl From<ElectionId> for u128 {
    fn from(id: ElectionId) -> Self {
        ((id.high as u128) << 64) | id.low as u128
    }
}

impl From<&Uint128> for ElectionId {
    fn from(x: &Uint128) -> Self {
        ElectionId::new(x.high, x.low)
    }
}

impl FromStr for ElectionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(str::parse::<u128>(s)?.into())
    }
}

impl Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u128::from(*self))
    }
}

/// Counter behind every source built with [`ElectionIdSource::new`], so that independently built
/// sources in one process never repeat each other's ids.
static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
enum Counter {
    Process,
    Own(AtomicU64),
}

/// Hands out election ids that differ across processes and across calls
/// within one process, even when they fall in the same second.
///
/// The high half is the current Unix time in seconds.  The low half is a seed plus a counter;
/// [`new`](Self::new) seeds with the process id in the upper 32 bits and draws from a counter
/// shared by the whole process.
#[derive(Debug)]
pub struct ElectionIdSource {
    seed: u64,
    counter: Counter,
}

impl ElectionIdSource {
    pub fn new() -> Self {
        ElectionIdSource {
            seed: (std::process::id() as u64) << 32,
            counter: Counter::Process,
        }
    }

    /// A source with its own counter starting at `seed`.  Ids are unique only among sources
    /// with disjoint ranges.
    pub fn with_seed(seed: u64) -> Self {
        ElectionIdSource {
            seed,
            counter: Counter::Own(AtomicU64::new(0)),
        }
    }

    pub fn next(&self) -> ElectionId {
        let high = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let n = match &self.counter {
            Counter::Process => PROCESS_COUNTER.fetch_add(1, Ordering::Relaxed),
            Counter::Own(counter) => counter.fetch_add(1, Ordering::Relaxed),
        };
        ElectionId {
            high,
            low: self.seed.wrapping_add(n),
        }
    }
}

impl Default for ElectionIdSource {
    fn default() -> Self {
        Self::new()
    }
}
