use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::future::Future;
use flate2::read::GzDecoder;
use futures::stream::StreamExt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio::runtime;
use tokio::signal;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use chatty_trace::{AllocationEvent, FunctionTag, ReadError, ThreadId, TraceReader};

mod live;
mod stats;

use stats::Summary;

/// Inspect allocation traces recorded by chattymalloc
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// More log output, repeat for more
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every call of a trace
    Dump {
        /// Trace file, gzip compressed if it ends in .gz
        trace: PathBuf,
        /// Only show calls of this function
        #[clap(short, long)]
        function: Option<FunctionTag>,
        /// Only show calls of this thread
        #[clap(short, long)]
        thread: Option<ThreadId>,
        /// Abort on the first invalid record
        #[clap(long)]
        strict: bool,
    },
    /// Summarize a trace
    Stats {
        /// Trace file, gzip compressed if it ends in .gz
        trace: PathBuf,
        /// Abort on the first invalid record
        #[clap(long)]
        strict: bool,
    },
    /// Read records live from a pipe until EOF or Ctrl-C and summarize them
    Follow {
        /// FIFO to read from, stdin if omitted
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;

    match args.command {
        Command::Dump {
            trace,
            function,
            thread,
            strict,
        } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut result = Ok(());
            decode_trace(&trace, strict, |event| {
                if function.map_or(false, |f| f != event.function)
                    || thread.map_or(false, |t| t != event.thread_id)
                {
                    return;
                }
                if result.is_ok() {
                    result = writeln!(out, "[{}] {}", event.thread_id, event.call());
                }
            })?;
            result.context("failed to write output")?;
        }
        Command::Stats { trace, strict } => {
            let mut summary = Summary::default();
            let invalid = decode_trace(&trace, strict, |event| summary.record(event))?;
            summary.skip_invalid(invalid);
            summary
                .print(&mut io::stdout().lock())
                .context("failed to write output")?;
        }
        Command::Follow { path } => {
            let summary = follow(path)?;
            println!();
            summary
                .print(&mut io::stdout().lock())
                .context("failed to write output")?;
        }
    }
    Ok(())
}

fn open_trace(path: &Path) -> Result<Box<dyn Read>> {
    let file =
        File::open(path).with_context(|| format!("failed to open trace {}", path.display()))?;
    let reader = BufReader::new(file);
    if path.extension().map_or(false, |ext| ext == "gz") {
        debug!("decompressing {}", path.display());
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Feeds every valid record of the trace at `path` to `handle` and returns the
/// number of invalid records that were skipped.
fn decode_trace<F>(path: &Path, strict: bool, mut handle: F) -> Result<u64>
where
    F: FnMut(&AllocationEvent),
{
    let mut invalid = 0;
    let mut reader = TraceReader::new(open_trace(path)?);
    for item in reader.by_ref() {
        match item {
            Ok(event) => handle(&event),
            Err(e @ ReadError::Io(_)) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
            Err(e) if strict => {
                return Err(e).with_context(|| format!("invalid trace {}", path.display()))
            }
            Err(e) => {
                warn!("skipping record: {:#}", anyhow::Error::from(e));
                invalid += 1;
            }
        }
    }
    info!("read {} bytes from {}", reader.offset(), path.display());
    Ok(invalid)
}

fn follow(path: Option<PathBuf>) -> Result<Summary> {
    let rt = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let summary = rt.block_on(async move {
        let input: Pin<Box<dyn AsyncRead + Send>> = match &path {
            Some(path) => Box::pin(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            ),
            None => Box::pin(tokio::io::stdin()),
        };
        eprintln!("Reading allocation events, hit Ctrl-C to stop!");
        summarize_events(input, signal::ctrl_c()).await
    });
    // An idle pipe read holds a blocking pool thread until the writer closes.
    rt.shutdown_background();
    summary
}

/// Summarizes records from `input` until EOF, a fatal read error or until
/// `shutdown` completes.
async fn summarize_events<R, S>(input: R, shutdown: S) -> Result<Summary>
where
    R: AsyncRead + Unpin,
    S: Future,
{
    let events = live::record_stream(input);
    tokio::pin!(events);
    tokio::pin!(shutdown);

    let mut summary = Summary::default();
    loop {
        tokio::select! {
            item = events.next() => match item {
                Some(Ok(event)) => {
                    debug!(tid = event.thread_id, "{}", event.call());
                    summary.record(&event);
                }
                Some(Err(e @ ReadError::Io(_))) => {
                    return Err(e).context("failed to read allocation events");
                }
                Some(Err(e)) => {
                    let recoverable = e.is_recoverable();
                    warn!("skipping record: {:#}", anyhow::Error::from(e));
                    summary.skip_invalid(1);
                    if !recoverable {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }
    info!("received {} allocation events", summary.events());
    Ok(summary)
}
