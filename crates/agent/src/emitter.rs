//! Response frames for streaming delivery.
//!
//! A response is delivered as exactly one `metadata` frame, zero or more
//! `content` frames carrying the answer in word-sized pieces, and exactly
//! one `done` frame. Concatenating the content frames reproduces the answer.

use medquery_core::response::{Note, Response, RouteDecision, ToolCallRecord};
use medquery_core::trace::{ConfidenceLevel, Trace};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFrame {
    /// Everything about the answer except its text.
    Metadata {
        success: bool,
        confidence: f64,
        confidence_level: ConfidenceLevel,
        route: RouteDecision,
        tool_calls: Vec<ToolCallRecord>,
        note: Option<Note>,
        degraded: bool,
        cached: bool,
        trace: Box<Trace>,
    },

    /// A piece of the answer text.
    Content { text: String },

    /// The stream is complete.
    Done { trace_id: String },
}

impl ResponseFrame {
    /// SSE event name for this frame.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Metadata { .. } => "metadata",
            Self::Content { .. } => "content",
            Self::Done { .. } => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Metadata,
    Content { offset: usize },
    Finished,
}

/// The frames of one response, as a restartable iterator.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    response: Arc<Response>,
    stage: Stage,
}

impl FrameSequence {
    pub fn new(response: Response) -> Self {
        Self {
            response: Arc::new(response),
            stage: Stage::Metadata,
        }
    }

    fn metadata(&self) -> ResponseFrame {
        let r = &self.response;
        ResponseFrame::Metadata {
            success: r.success,
            confidence: r.confidence,
            confidence_level: r.confidence_level,
            route: r.route.clone(),
            tool_calls: r.tool_calls.clone(),
            note: r.note.clone(),
            degraded: r.degraded,
            cached: r.cached,
            trace: Box::new(r.trace.clone()),
        }
    }
}

impl Iterator for FrameSequence {
    type Item = ResponseFrame;

    fn next(&mut self) -> Option<ResponseFrame> {
        match self.stage {
            Stage::Metadata => {
                self.stage = Stage::Content { offset: 0 };
                Some(self.metadata())
            }
            Stage::Content { offset } => {
                let rest = &self.response.answer[offset..];
                match rest.split_inclusive(' ').next() {
                    Some(piece) => {
                        let text = piece.to_string();
                        self.stage = Stage::Content {
                            offset: offset + text.len(),
                        };
                        Some(ResponseFrame::Content { text })
                    }
                    None => {
                        self.stage = Stage::Finished;
                        Some(ResponseFrame::Done {
                            trace_id: self.response.trace_id().to_string(),
                        })
                    }
                }
            }
            Stage::Finished => None,
        }
    }
}

/// Push a frame sequence into a bounded channel from a spawned task.
///
/// Delivery stops as soon as the receiver is dropped.
pub fn spawn_frames(frames: FrameSequence, capacity: usize) -> mpsc::Receiver<ResponseFrame> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        deliver(frames, &tx).await;
    });
    rx
}

/// Send every frame in order. Returns false if the receiver went away first.
pub async fn deliver(frames: FrameSequence, tx: &mpsc::Sender<ResponseFrame>) -> bool {
    for frame in frames {
        if tx.send(frame).await.is_err() {
            debug!("Frame receiver dropped, stopping delivery");
            return false;
        }
    }
    true
}

/// Concatenate the text of all content frames.
pub fn collect_answer<'a>(frames: impl IntoIterator<Item = &'a ResponseFrame>) -> String {
    frames
        .into_iter()
        .filter_map(|f| match f {
            ResponseFrame::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_response;

    #[test]
    fn frame_order_and_counts() {
        let frames: Vec<_> = FrameSequence::new(sample_response("Prenez un comprimé.", false)).collect();
        assert_eq!(frames.first().unwrap().event_type(), "metadata");
        assert_eq!(frames.last().unwrap().event_type(), "done");
        assert_eq!(frames.iter().filter(|f| f.event_type() == "metadata").count(), 1);
        assert_eq!(frames.iter().filter(|f| f.event_type() == "done").count(), 1);
        assert_eq!(frames.len(), 2 + 3);
    }

    #[test]
    fn concatenation_reproduces_answer() {
        for answer in [
            "Doliprane 1000mg (Paracétamol)\n\nDosage:  1 comprimé ",
            "  leading and trailing  ",
            "one",
            "**Médicaments pour fièvre:**\n\n• Doliprane",
        ] {
            let frames: Vec<_> = FrameSequence::new(sample_response(answer, false)).collect();
            assert_eq!(collect_answer(&frames), answer);
        }
    }

    #[test]
    fn empty_answer_has_no_content_frames() {
        let frames: Vec<_> = FrameSequence::new(sample_response("", false)).collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn sequence_is_restartable() {
        let seq = FrameSequence::new(sample_response("a b c", false));
        let first: Vec<_> = seq.clone().collect();
        let second: Vec<_> = seq.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn frames_serialize_with_type_tag() {
        let json = serde_json::to_value(ResponseFrame::Content { text: "hi ".into() }).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["text"], "hi ");

        let mut seq = FrameSequence::new(sample_response("x", false));
        let metadata = serde_json::to_value(seq.next().unwrap()).unwrap();
        assert_eq!(metadata["type"], "metadata");
        assert_eq!(metadata["route"]["path"], "fast_path");
    }

    #[tokio::test]
    async fn channel_delivers_all_frames() {
        let response = sample_response("un deux trois", false);
        let mut rx = spawn_frames(FrameSequence::new(response.clone()), 2);
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(collect_answer(&frames), response.answer);
        assert_eq!(frames.last().unwrap(), &ResponseFrame::Done { trace_id: response.trace.trace_id.clone() });
    }

    #[tokio::test]
    async fn dropped_receiver_stops_delivery() {
        let rx = spawn_frames(FrameSequence::new(sample_response("a b c d e f", false)), 1);
        drop(rx);
        // The producer task ends on the first failed send instead of blocking
        tokio::task::yield_now().await;
    }
}
