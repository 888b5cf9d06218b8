use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncReadExt};

use chatty_trace::{AllocationEvent, ReadError, RecordError, RECORD_SIZE};

struct State<R> {
    reader: R,
    offset: u64,
    done: bool,
}

/// Async counterpart of `TraceReader` for pipes and FIFOs a producer is still
/// writing to.
pub fn record_stream<R>(reader: R) -> impl Stream<Item = Result<AllocationEvent, ReadError>>
where
    R: AsyncRead + Unpin,
{
    let state = State {
        reader,
        offset: 0,
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match state.reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    state.done = true;
                    return Some((Err(ReadError::Io(e)), state));
                }
            }
        }
        if filled == 0 {
            return None;
        }

        let offset = state.offset;
        state.offset += filled as u64;
        let item = if filled < RECORD_SIZE {
            state.done = true;
            Err(ReadError::Record {
                offset,
                source: RecordError::MalformedRecord { len: filled },
            })
        } else {
            AllocationEvent::decode(&buf).map_err(|source| ReadError::Record { offset, source })
        };
        Some((item, state))
    })
}
