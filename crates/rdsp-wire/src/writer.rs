//! Priority-queued outbound writer with backpressure.
//!
//! Readers and writers are logically independent: the reader delivers
//! packets strictly in arrival order, while the writer drains a priority
//! queue (urgent, interactive, bulk) FIFO within each priority. Enqueuing
//! past a high-watermark of bytes-in-flight is refused, signalling
//! backpressure up to the subsystem that tried to send.

use std::collections::VecDeque;

use crate::error::WireError;
use crate::frame::Frame;
use crate::transport::Transport;

/// Send priority. Lower numeric value drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Urgent,
    Interactive,
    Bulk,
}

const PRIORITY_COUNT: usize = 3;

fn priority_index(p: Priority) -> usize {
    match p {
        Priority::Urgent => 0,
        Priority::Interactive => 1,
        Priority::Bulk => 2,
    }
}

/// Bytes-in-flight above which new enqueues are refused until the writer
/// drains some of the backlog.
pub const DEFAULT_HIGH_WATERMARK: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue is over the high watermark ({bytes_in_flight} bytes queued)")]
    Backpressure { bytes_in_flight: usize },
    #[error("writer is closing, no further sends accepted")]
    Closing,
}

enum CloseState {
    Open,
    Closing { reason: String },
    Closed,
}

/// A priority queue of outbound frames plus the machinery to drain it onto
/// a [`Transport`].
pub struct OutboundWriter {
    queues: [VecDeque<Frame>; PRIORITY_COUNT],
    bytes_in_flight: usize,
    high_watermark: usize,
    state: CloseState,
}

impl OutboundWriter {
    pub fn new() -> Self {
        Self::with_high_watermark(DEFAULT_HIGH_WATERMARK)
    }

    pub fn with_high_watermark(high_watermark: usize) -> Self {
        Self {
            queues: Default::default(),
            bytes_in_flight: 0,
            high_watermark,
            state: CloseState::Open,
        }
    }

    /// Enqueues one frame at the given priority. A logical packet with
    /// side-channel chunks is a main frame (chunk index 0) followed by
    /// its chunk frames (index 1-7), each enqueued here in turn by the
    /// caller — see [`crate::pipeline::FramePipeline::encode`], which the
    /// session layer uses to build all of a packet's frames before
    /// calling this once per frame so nothing else lands between them.
    /// Refuses new work once closing has begun, or once bytes-in-flight
    /// exceeds the high watermark — unless the frame is itself part of
    /// the must-send-before-close drain.
    pub fn enqueue(&mut self, priority: Priority, frame: Frame) -> Result<(), EnqueueError> {
        match &self.state {
            CloseState::Closing { .. } | CloseState::Closed => {
                return Err(EnqueueError::Closing);
            }
            CloseState::Open => {}
        }
        if self.bytes_in_flight >= self.high_watermark {
            return Err(EnqueueError::Backpressure {
                bytes_in_flight: self.bytes_in_flight,
            });
        }
        self.bytes_in_flight += frame.payload.len();
        self.queues[priority_index(priority)].push_back(frame);
        Ok(())
    }

    /// Pops the next frame to send, highest priority first, FIFO within a
    /// priority.
    pub fn pop_next(&mut self) -> Option<Frame> {
        for queue in &mut self.queues {
            if let Some(frame) = queue.pop_front() {
                self.bytes_in_flight = self.bytes_in_flight.saturating_sub(frame.payload.len());
                return Some(frame);
            }
        }
        None
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    pub fn is_over_watermark(&self) -> bool {
        self.bytes_in_flight >= self.high_watermark
    }

    /// Begins orderly shutdown: no further `enqueue` calls are accepted,
    /// but whatever is already queued is still drained by `pop_next`.
    pub fn begin_close(&mut self, reason: impl Into<String>) {
        if matches!(self.state, CloseState::Open) {
            self.state = CloseState::Closing {
                reason: reason.into(),
            };
        }
    }

    pub fn is_drained(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// Drains whatever remains onto `transport`, then marks the writer
    /// closed. Used once `begin_close` has been called and the
    /// must-send-before-close set has been queued.
    pub async fn drain_and_close(&mut self, transport: &Transport) -> Result<(), WireError> {
        while let Some(frame) = self.pop_next() {
            transport.send_frame(frame).await?;
        }
        self.state = CloseState::Closed;
        transport.close();
        Ok(())
    }
}

impl Default for OutboundWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CompressionMethod, FrameFlags, FrameHeader};

    fn frame(len: usize) -> Frame {
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::None), 0, len as u32)
            .unwrap();
        Frame {
            header,
            payload: vec![0u8; len],
        }
    }

    #[test]
    fn drains_highest_priority_first() {
        let mut writer = OutboundWriter::new();
        writer.enqueue(Priority::Bulk, frame(1)).unwrap();
        writer.enqueue(Priority::Urgent, frame(2)).unwrap();
        writer.enqueue(Priority::Interactive, frame(3)).unwrap();

        assert_eq!(writer.pop_next().unwrap().payload.len(), 2);
        assert_eq!(writer.pop_next().unwrap().payload.len(), 3);
        assert_eq!(writer.pop_next().unwrap().payload.len(), 1);
        assert!(writer.pop_next().is_none());
    }

    #[test]
    fn fifo_within_a_priority() {
        let mut writer = OutboundWriter::new();
        writer.enqueue(Priority::Bulk, frame(1)).unwrap();
        writer.enqueue(Priority::Bulk, frame(2)).unwrap();
        assert_eq!(writer.pop_next().unwrap().payload.len(), 1);
        assert_eq!(writer.pop_next().unwrap().payload.len(), 2);
    }

    #[test]
    fn refuses_enqueue_past_high_watermark() {
        let mut writer = OutboundWriter::with_high_watermark(10);
        writer.enqueue(Priority::Bulk, frame(8)).unwrap();
        assert!(matches!(
            writer.enqueue(Priority::Bulk, frame(8)),
            Err(EnqueueError::Backpressure { .. })
        ));
    }

    #[test]
    fn refuses_enqueue_once_closing() {
        let mut writer = OutboundWriter::new();
        writer.begin_close("shutting down");
        assert!(matches!(
            writer.enqueue(Priority::Urgent, frame(1)),
            Err(EnqueueError::Closing)
        ));
    }
}
