//! Length-prefixed frame transport.
//!
//! Two message shapes travel over a single ordered byte stream:
//!
//! - client → server: `[u32 BE length][u8 flag][length bytes of NV21 payload]`
//! - server → client: `[u32 BE length][length bytes of compressed image]`
//!
//! There is no acknowledgement, sequencing, or resend. Readers block until
//! every declared byte has arrived; a stream that ends part-way through a
//! message is a protocol error, never a short frame.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Size of the client → server header (length + flag).
pub const FRAME_HEADER_LEN: usize = 5;

/// Size of the server → client header (length only).
pub const IMAGE_HEADER_LEN: usize = 4;

/// Default upper bound on an inbound payload (32 MiB).
pub const DEFAULT_MAX_PAYLOAD: u32 = 32 * 1024 * 1024;

/// Wire-level failures.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed the stream cleanly on a message boundary.
    #[error("stream closed by peer")]
    Closed,

    #[error("truncated message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("declared payload length {len} exceeds limit of {max} bytes")]
    TooLarge { len: u32, max: u32 },

    #[error("payload of {0} bytes does not fit the u32 length field")]
    PayloadOverflow(usize),

    #[error("invalid flag byte {0:#04x}")]
    InvalidFlag(u8),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// Whether the error means the peer went away without violating framing.
    pub fn is_closed(&self) -> bool {
        matches!(self, WireError::Closed)
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, WireError>;

/// A packed raw frame sent from the client to the inference server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrameMessage {
    /// Whether the server should run inference on this frame.
    pub ml_enabled: bool,
    /// Planar frame bytes. The length field is always derived from this.
    pub payload: Vec<u8>,
}

impl RawFrameMessage {
    pub fn new(payload: Vec<u8>, ml_enabled: bool) -> Self {
        Self {
            ml_enabled,
            payload,
        }
    }

    /// Build the 5-byte header for this message.
    pub fn header(&self) -> Result<[u8; FRAME_HEADER_LEN]> {
        let len = payload_len(&self.payload)?;
        let mut header = [0u8; FRAME_HEADER_LEN];
        header[..4].copy_from_slice(&len.to_be_bytes());
        header[4] = u8::from(self.ml_enabled);
        Ok(header)
    }

    /// Write header and payload, then flush.
    ///
    /// Callers must funnel all writes for one stream through a single writer
    /// so messages never interleave.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = self.header()?;
        writer.write_all(&header)?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one message, rejecting payloads above `max_payload` before
    /// allocating.
    pub fn read_from<R: Read>(reader: &mut R, max_payload: u32) -> Result<Self> {
        let header: [u8; FRAME_HEADER_LEN] = read_header(reader)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let ml_enabled = match header[4] {
            0 => false,
            1 => true,
            other => return Err(WireError::InvalidFlag(other)),
        };
        let payload = read_payload(reader, len, max_payload)?;
        Ok(Self {
            ml_enabled,
            payload,
        })
    }
}

/// A compressed image sent from the server back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub payload: Vec<u8>,
}

impl ImageMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Build the 4-byte header for this message.
    pub fn header(&self) -> Result<[u8; IMAGE_HEADER_LEN]> {
        Ok(payload_len(&self.payload)?.to_be_bytes())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = self.header()?;
        writer.write_all(&header)?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one message, blocking until the full payload has arrived.
    pub fn read_from<R: Read>(reader: &mut R, max_payload: u32) -> Result<Self> {
        let header: [u8; IMAGE_HEADER_LEN] = read_header(reader)?;
        let len = u32::from_be_bytes(header);
        let payload = read_payload(reader, len, max_payload)?;
        Ok(Self { payload })
    }
}

fn payload_len(payload: &[u8]) -> Result<u32> {
    u32::try_from(payload.len()).map_err(|_| WireError::PayloadOverflow(payload.len()))
}

fn read_header<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut header = [0u8; N];
    let received = read_full(reader, &mut header)?;
    match received {
        0 => Err(WireError::Closed),
        n if n < N => Err(WireError::Truncated {
            expected: N,
            received: n,
        }),
        _ => Ok(header),
    }
}

fn read_payload<R: Read>(reader: &mut R, len: u32, max_payload: u32) -> Result<Vec<u8>> {
    if len > max_payload {
        return Err(WireError::TooLarge {
            len,
            max: max_payload,
        });
    }
    let expected = len as usize;
    let mut payload = vec![0u8; expected];
    let received = read_full(reader, &mut payload)?;
    if received < expected {
        return Err(WireError::Truncated { expected, received });
    }
    Ok(payload)
}

/// Fill `buf` from `reader`, stopping early only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
