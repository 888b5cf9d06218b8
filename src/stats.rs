use std::collections::BTreeMap;
use std::io::{self, Write};

use ahash::AHashMap;
use owo_colors::{OwoColorize, Stream::Stdout};

use chatty_trace::{AllocationEvent, Call, FunctionTag, ThreadId};

const HIST_WIDTH: u64 = 50;

/// Aggregate view of one trace.
#[derive(Debug, Default)]
pub struct Summary {
    events: u64,
    invalid: u64,
    calls: AHashMap<FunctionTag, u64>,
    threads: AHashMap<ThreadId, u64>,
    request_sizes: AHashMap<usize, u64>,
    // block address -> requested size
    live: AHashMap<usize, usize>,
    live_bytes: usize,
    peak_bytes: usize,
    failed: u64,
    unmatched_frees: u64,
}

impl Summary {
    pub fn record(&mut self, event: &AllocationEvent) {
        self.events += 1;
        *self.calls.entry(event.function).or_default() += 1;
        *self.threads.entry(event.thread_id).or_default() += 1;

        let call = event.call();
        let requested = match call.requested_bytes() {
            Some(requested) => requested,
            None => {
                if let Call::Free { ptr } = call {
                    self.release(ptr);
                }
                return;
            }
        };
        *self.request_sizes.entry(requested).or_default() += 1;

        let result = call.result().unwrap_or(0);
        if result == 0 {
            // A failed realloc leaves the old block untouched.
            if requested > 0 {
                self.failed += 1;
            } else if let Some(old) = call.released() {
                self.release(old);
            }
            return;
        }
        if let Some(old) = call.released() {
            self.release(old);
        }
        if let Some(previous) = self.live.insert(result, requested) {
            self.live_bytes = self.live_bytes.saturating_sub(previous);
        }
        self.live_bytes = self.live_bytes.saturating_add(requested);
        self.peak_bytes = self.peak_bytes.max(self.live_bytes);
    }

    /// Counts records that could not be decoded.
    pub fn skip_invalid(&mut self, records: u64) {
        self.invalid += records;
    }

    fn release(&mut self, ptr: usize) {
        if ptr == 0 {
            return;
        }
        match self.live.remove(&ptr) {
            Some(size) => self.live_bytes = self.live_bytes.saturating_sub(size),
            None => self.unmatched_frees += 1,
        }
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn calls(&self, function: FunctionTag) -> u64 {
        self.calls.get(&function).copied().unwrap_or(0)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    /// The `n` most frequently requested sizes, most frequent first.
    pub fn top_sizes(&self, n: usize) -> Vec<(usize, u64)> {
        let mut sizes: Vec<_> = self
            .request_sizes
            .iter()
            .map(|(size, count)| (*size, *count))
            .collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        sizes.truncate(n);
        sizes
    }

    /// Request counts grouped by the next power of two of the size.
    pub fn histogram(&self) -> BTreeMap<usize, u64> {
        let mut hist = BTreeMap::new();
        for (size, count) in &self.request_sizes {
            let bucket = size.checked_next_power_of_two().unwrap_or(usize::MAX);
            *hist.entry(bucket).or_default() += count;
        }
        hist
    }

    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{}",
            "Allocator calls".if_supports_color(Stdout, |t| t.bold())
        )?;
        for function in FunctionTag::ALL {
            let count = self.calls(function);
            if count > 0 {
                writeln!(out, "  {:<16}{count}", function.name())?;
            }
        }
        writeln!(
            out,
            "  {} events from {} threads, {} invalid records skipped",
            self.events(),
            self.threads.len(),
            self.invalid
        )?;
        writeln!(out)?;

        writeln!(
            out,
            "{}",
            "Request sizes".if_supports_color(Stdout, |t| t.bold())
        )?;
        let hist = self.histogram();
        let max = hist.values().copied().max().unwrap_or(0);
        for (bucket, count) in &hist {
            let width = (count * HIST_WIDTH).checked_div(max).unwrap_or(0).max(1);
            let bar = "*".repeat(width as usize);
            writeln!(
                out,
                "  <= {:<12}{:>10} {}",
                bucket,
                count,
                bar.if_supports_color(Stdout, |t| t.bright_blue())
            )?;
        }
        writeln!(out, "  most requested:")?;
        for (size, count) in self.top_sizes(5) {
            writeln!(out, "    {size:>12} bytes {count:>10} times")?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "{}",
            "Heap".if_supports_color(Stdout, |t| t.bold())
        )?;
        writeln!(out, "  peak live bytes   {}", self.peak_bytes())?;
        writeln!(
            out,
            "  still live        {} bytes in {} blocks",
            self.live_bytes(),
            self.live.len()
        )?;
        if self.failed > 0 {
            writeln!(
                out,
                "  failed requests   {}",
                self.failed.if_supports_color(Stdout, |t| t.red())
            )?;
        }
        if self.unmatched_frees > 0 {
            writeln!(
                out,
                "  unmatched frees   {}",
                self.unmatched_frees.if_supports_color(Stdout, |t| t.yellow())
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(call: Call) -> AllocationEvent {
        AllocationEvent::from_call(1, call)
    }

    #[test]
    fn tracks_live_and_peak_bytes() {
        let mut summary = Summary::default();
        summary.record(&event(Call::Malloc {
            size: 100,
            result: 0x10,
        }));
        summary.record(&event(Call::Calloc {
            nmemb: 4,
            size: 50,
            result: 0x20,
        }));
        summary.record(&event(Call::Free { ptr: 0x10 }));
        summary.record(&event(Call::Realloc {
            old: 0x20,
            size: 20,
            result: 0x30,
        }));

        assert_eq!(summary.events(), 4);
        assert_eq!(summary.peak_bytes(), 300);
        assert_eq!(summary.live_bytes(), 20);
        assert_eq!(summary.calls(FunctionTag::Free), 1);
        assert_eq!(summary.calls(FunctionTag::Valloc), 0);
        assert_eq!(summary.unmatched_frees, 0);
    }

    #[test]
    fn null_and_unknown_frees() {
        let mut summary = Summary::default();
        summary.record(&event(Call::Free { ptr: 0 }));
        summary.record(&event(Call::Free { ptr: 0xabc }));
        assert_eq!(summary.unmatched_frees, 1);
        assert_eq!(summary.live_bytes(), 0);
    }

    #[test]
    fn failed_realloc_keeps_old_block() {
        let mut summary = Summary::default();
        summary.record(&event(Call::Malloc {
            size: 64,
            result: 0x10,
        }));
        summary.record(&event(Call::Realloc {
            old: 0x10,
            size: usize::MAX / 2,
            result: 0,
        }));
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.live_bytes(), 64);

        summary.record(&event(Call::Realloc {
            old: 0x10,
            size: 0,
            result: 0,
        }));
        assert_eq!(summary.live_bytes(), 0);
    }

    #[test]
    fn top_sizes_and_histogram() {
        let mut summary = Summary::default();
        for (i, size) in [8, 8, 8, 24, 24, 1000, 3].iter().enumerate() {
            summary.record(&event(Call::Malloc {
                size: *size,
                result: 0x100 + i,
            }));
        }
        assert_eq!(summary.top_sizes(2), vec![(8, 3), (24, 2)]);
        assert_eq!(summary.top_sizes(10).len(), 4);

        let hist = summary.histogram();
        assert_eq!(hist.get(&8), Some(&3));
        assert_eq!(hist.get(&4), Some(&1));
        assert_eq!(hist.get(&32), Some(&2));
        assert_eq!(hist.get(&1024), Some(&1));
    }

    #[test]
    fn prints_report() {
        let mut summary = Summary::default();
        summary.record(&event(Call::Malloc {
            size: 64,
            result: 0xdeadbeef,
        }));
        summary.skip_invalid(1);
        summary.skip_invalid(2);

        let mut out = Vec::new();
        summary.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("malloc"));
        assert!(text.contains("3 invalid records skipped"));
        assert!(text.contains("peak live bytes   64"));
    }
}
