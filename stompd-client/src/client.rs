//! Blocking STOMP client.

use crate::error::ClientError;
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use stompd_protocol::{Frame, FrameCodec};

/// A blocking client for one STOMP connection.
///
/// Frames are read incrementally through an internal codec, so replies split
/// across TCP segments reassemble transparently.
pub struct Client {
    stream: TcpStream,
    codec: FrameCodec,
}

impl Client {
    /// Connects to a broker. No frame is sent; call [`login`](Client::login)
    /// to authenticate.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        tracing::debug!(peer = %stream.peer_addr()?, "connected");
        Ok(Self {
            stream,
            codec: FrameCodec::new(),
        })
    }

    /// Sets a read timeout for [`read_frame`](Client::read_frame). `None`
    /// blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Encodes and writes a frame.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        self.stream.write_all(&frame.encode())?;
        Ok(())
    }

    /// Reads the next complete frame, blocking until one arrives.
    ///
    /// Returns [`ClientError::ConnectionClosed`] once the server closes the
    /// connection with no complete frame buffered.
    pub fn read_frame(&mut self) -> Result<Frame, ClientError> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.codec.decode_frame()? {
                return Ok(frame);
            }
            match self.stream.read(&mut buf)? {
                0 => return Err(ClientError::ConnectionClosed),
                n => self.codec.extend(&buf[..n]),
            }
        }
    }

    /// Sends CONNECT and waits for the reply.
    ///
    /// Returns the CONNECTED frame, or [`ClientError::Rejected`] carrying the
    /// ERROR frame's message.
    pub fn login(&mut self, login: &str, passcode: &str) -> Result<Frame, ClientError> {
        let frame = Frame::new("CONNECT")
            .with_header("accept-version", "1.2")
            .with_header("host", "stompd")
            .with_header("login", login)
            .with_header("passcode", passcode);
        self.send_frame(&frame)?;

        let reply = self.read_frame()?;
        if reply.command == "CONNECTED" {
            Ok(reply)
        } else {
            let message = reply.header("message").unwrap_or("login failed").to_string();
            Err(ClientError::Rejected(message))
        }
    }

    /// Sends SUBSCRIBE. Pass a receipt id to have the broker acknowledge
    /// once the subscription is live.
    pub fn subscribe(
        &mut self,
        destination: &str,
        id: u64,
        receipt: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut frame = Frame::new("SUBSCRIBE")
            .with_header("destination", destination)
            .with_header("id", id.to_string());
        if let Some(receipt) = receipt {
            frame = frame.with_header("receipt", receipt);
        }
        self.send_frame(&frame)
    }

    /// Sends UNSUBSCRIBE for a subscription id.
    pub fn unsubscribe(&mut self, id: u64, receipt: Option<&str>) -> Result<(), ClientError> {
        let mut frame = Frame::new("UNSUBSCRIBE").with_header("id", id.to_string());
        if let Some(receipt) = receipt {
            frame = frame.with_header("receipt", receipt);
        }
        self.send_frame(&frame)
    }

    /// Sends SEND with a body to a destination.
    pub fn publish(&mut self, destination: &str, body: impl Into<Bytes>) -> Result<(), ClientError> {
        let frame = Frame::new("SEND")
            .with_header("destination", destination)
            .with_body(body.into());
        self.send_frame(&frame)
    }

    /// Sends DISCONNECT and waits for the receipt.
    pub fn disconnect(&mut self, receipt: &str) -> Result<Frame, ClientError> {
        let frame = Frame::new("DISCONNECT").with_header("receipt", receipt);
        self.send_frame(&frame)?;
        self.read_frame()
    }

    /// Reads frames until one matches `predicate`, returning it. Frames that
    /// do not match are discarded.
    pub fn read_until(
        &mut self,
        mut predicate: impl FnMut(&Frame) -> bool,
    ) -> Result<Frame, ClientError> {
        loop {
            let frame = self.read_frame()?;
            if predicate(&frame) {
                return Ok(frame);
            }
        }
    }
}
