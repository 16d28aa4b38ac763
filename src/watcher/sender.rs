//! Outbound delivery of meeting state notifications.

use crate::framing::{self, FrameError};
use crate::message::MeetingStateMessage;
use std::cell::RefCell;
use std::io::Write;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection to the host is closed")]
    Disconnected,
    #[error("failed to write frame: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to write message: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Anything that can carry a notification toward the remote consumer.
///
/// The watcher calls this once per detected transition and hands any error
/// straight back to its caller.
pub trait MessageSender {
    fn send_message(&self, message: MeetingStateMessage) -> Result<(), SendError>;
}

impl<F> MessageSender for F
where
    F: Fn(MeetingStateMessage) -> Result<(), SendError>,
{
    fn send_message(&self, message: MeetingStateMessage) -> Result<(), SendError> {
        self(message)
    }
}

/// Forwards notifications into an in-process channel.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<MeetingStateMessage>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::UnboundedSender<MeetingStateMessage>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MeetingStateMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl MessageSender for ChannelSender {
    fn send_message(&self, message: MeetingStateMessage) -> Result<(), SendError> {
        self.tx.send(message).map_err(|_| SendError::Disconnected)
    }
}

/// Writes each notification as a native messaging frame.
pub struct FrameSender<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> FrameSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> MessageSender for FrameSender<W> {
    fn send_message(&self, message: MeetingStateMessage) -> Result<(), SendError> {
        framing::write_frame(&mut *self.writer.borrow_mut(), &message)?;
        Ok(())
    }
}

/// Writes each notification as one line of JSON.
pub struct JsonLineSender<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLineSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> MessageSender for JsonLineSender<W> {
    fn send_message(&self, message: MeetingStateMessage) -> Result<(), SendError> {
        let mut writer = self.writer.borrow_mut();
        serde_json::to_writer(&mut *writer, &message)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sender_delivers() {
        let (sender, mut rx) = ChannelSender::channel();
        sender.send_message(MeetingStateMessage::new(true)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), MeetingStateMessage::new(true));
    }

    #[test]
    fn test_channel_sender_closed() {
        let (sender, rx) = ChannelSender::channel();
        drop(rx);
        assert!(matches!(
            sender.send_message(MeetingStateMessage::new(false)),
            Err(SendError::Disconnected)
        ));
    }

    #[test]
    fn test_frame_sender_writes_frame() {
        let sender = FrameSender::new(Vec::new());
        sender.send_message(MeetingStateMessage::new(false)).unwrap();

        let bytes = sender.into_inner();
        let expected = framing::encode_frame(&MeetingStateMessage::new(false)).unwrap();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_json_line_sender() {
        let sender = JsonLineSender::new(Vec::new());
        sender.send_message(MeetingStateMessage::new(true)).unwrap();
        sender.send_message(MeetingStateMessage::new(false)).unwrap();

        let text = String::from_utf8(sender.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\"event\":\"meetingState\",\"active\":true}\n{\"event\":\"meetingState\",\"active\":false}\n"
        );
    }

    #[test]
    fn test_closure_sender() {
        let sender = |message: MeetingStateMessage| {
            if message.active {
                Ok(())
            } else {
                Err(SendError::Disconnected)
            }
        };
        assert!(sender.send_message(MeetingStateMessage::new(true)).is_ok());
        assert!(sender.send_message(MeetingStateMessage::new(false)).is_err());
    }
}
