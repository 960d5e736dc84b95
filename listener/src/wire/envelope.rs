//! Message envelope framing.
//!
//! Every message is framed by a fixed 24 byte header:
//!
//! | Field    | Size | Encoding                                 |
//! |----------|------|------------------------------------------|
//! | magic    | 4    | network identifier, little-endian u32    |
//! | command  | 12   | ASCII, NUL padded                        |
//! | length   | 4    | payload byte count, little-endian u32    |
//! | checksum | 4    | first 4 bytes of sha256(sha256(payload)) |
//!
//! followed by `length` bytes of payload.

use super::WireError;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::p2p::Magic;
use std::borrow::Cow;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a message header in bytes.
pub const HEADER_SIZE: usize = 24;
/// Largest payload accepted, guards against a corrupt length field causing
/// an unbounded allocation.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
/// Size of the command field in bytes.
const COMMAND_SIZE: usize = 12;

/// Computes the checksum of a payload, the first 4 bytes of its double SHA-256.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d::Hash::hash(payload).to_byte_array();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// The 12 byte command field of a message header.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command([u8; COMMAND_SIZE]);

impl Command {
    /// Initial handshake message.
    pub const VERSION: Command = Command::new("version");
    /// Handshake acknowledgement.
    pub const VERACK: Command = Command::new("verack");

    /// Create a command from a name, truncated or NUL padded to exactly 12 bytes.
    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut field = [0u8; COMMAND_SIZE];
        let mut i = 0;
        while i < bytes.len() && i < COMMAND_SIZE {
            field[i] = bytes[i];
            i += 1;
        }
        Command(field)
    }

    /// Create a command from the raw header field.
    pub fn from_bytes(field: [u8; COMMAND_SIZE]) -> Self {
        Command(field)
    }

    /// The raw, padded, header field.
    pub fn as_bytes(&self) -> &[u8; COMMAND_SIZE] {
        &self.0
    }

    /// The command name with padding trimmed.
    pub fn as_str(&self) -> Cow<'_, str> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_SIZE);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({:?})", self.as_str())
    }
}

/// A framed message, header fields plus the raw payload.
///
/// Envelopes built with [`Envelope::new`] always satisfy `length == payload.len()`
/// and carry the correct checksum. Envelopes read off the wire carry the checksum
/// the peer declared, use [`Envelope::verify_checksum`] before trusting the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    magic: Magic,
    command: Command,
    length: u32,
    checksum: [u8; 4],
    payload: Vec<u8>,
}

impl Envelope {
    /// Frame a payload for the given network.
    ///
    /// The size cap is enforced by [`EnvelopeWriter::write`], not here. Oversized
    /// payloads can be framed but not sent. The declared length saturates at
    /// `u32::MAX`.
    pub fn new(magic: Magic, command: Command, payload: Vec<u8>) -> Self {
        Self {
            magic,
            command,
            length: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            checksum: checksum(&payload),
            payload,
        }
    }

    /// Network magic of the message.
    pub fn magic(&self) -> Magic {
        self.magic
    }

    /// Command of the message.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Payload length as declared in the header.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Checksum as declared in the header.
    pub fn checksum(&self) -> [u8; 4] {
        self.checksum
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the envelope, returning the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Whether the declared checksum matches the one computed over the payload.
    pub fn verify_checksum(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.magic.to_bytes());
        buf.extend_from_slice(self.command.as_bytes());
        buf.extend_from_slice(&self.length.to_le_bytes());
        buf.extend_from_slice(&self.checksum);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, magic {})",
            self.command, self.length, self.magic
        )
    }
}

/// Parsed fixed size header, held while the payload is read.
#[derive(Debug, Clone, Copy)]
struct Header {
    magic: Magic,
    command: Command,
    length: u32,
    checksum: [u8; 4],
}

impl Header {
    fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut command = [0u8; COMMAND_SIZE];
        command.copy_from_slice(&bytes[4..16]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&bytes[16..20]);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&bytes[20..24]);

        Header {
            magic: Magic::from_bytes(magic),
            command: Command::from_bytes(command),
            length: u32::from_le_bytes(length),
            checksum,
        }
    }
}

/// State machine for the [`EnvelopeReader::read`] method.
///
/// Progress is kept across interruptions, so a `read` future dropped by
/// `tokio::select!` resumes where it left off on the next call.
#[derive(Debug)]
enum ReceiveState {
    /// Reading the message header (24 bytes).
    ReadingHeader {
        header: [u8; HEADER_SIZE],
        bytes_read: usize,
    },
    /// Reading the message payload.
    ReadingPayload {
        header: Header,
        payload: Vec<u8>,
        bytes_read: usize,
    },
}

impl ReceiveState {
    fn reading_header() -> Self {
        ReceiveState::ReadingHeader {
            header: [0u8; HEADER_SIZE],
            bytes_read: 0,
        }
    }

    fn reading_payload(header: Header) -> Self {
        ReceiveState::ReadingPayload {
            payload: vec![0u8; header.length as usize],
            header,
            bytes_read: 0,
        }
    }
}

/// Reads envelopes off a byte stream.
///
/// The reader frames bytes only. It does not check the network magic or the
/// checksum, that is up to the layer interpreting the payload.
#[derive(Debug)]
pub struct EnvelopeReader<R> {
    /// Current state of the read operation.
    receive_state: ReceiveState,
    /// The IO reader.
    reader: R,
}

impl<R> EnvelopeReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a new envelope reader.
    pub fn new(reader: R) -> Self {
        Self {
            receive_state: ReceiveState::reading_header(),
            reader,
        }
    }

    /// Read the next envelope.
    ///
    /// # Errors
    ///
    /// * [`WireError::ConnectionClosed`] - Stream ended cleanly before the first header byte.
    /// * [`WireError::TruncatedInput`] - Stream ended inside the header or payload.
    /// * [`WireError::MessageTooLarge`] - Declared length exceeds [`MAX_PAYLOAD_SIZE`],
    ///   no payload bytes are read.
    /// * [`WireError::Io`] - Underlying I/O failure.
    ///
    /// # Cancellation Safety
    ///
    /// This method is cancellation safe.
    pub async fn read(&mut self) -> Result<Envelope, WireError> {
        loop {
            match &mut self.receive_state {
                ReceiveState::ReadingHeader { header, bytes_read } => {
                    while *bytes_read < HEADER_SIZE {
                        let n = self.reader.read(&mut header[*bytes_read..]).await?;
                        if n == 0 {
                            let err = if *bytes_read == 0 {
                                WireError::ConnectionClosed
                            } else {
                                WireError::TruncatedInput
                            };
                            self.receive_state = ReceiveState::reading_header();
                            return Err(err);
                        }
                        *bytes_read += n;
                    }

                    let parsed = Header::parse(header);
                    if parsed.length as usize > MAX_PAYLOAD_SIZE {
                        self.receive_state = ReceiveState::reading_header();
                        return Err(WireError::MessageTooLarge(parsed.length));
                    }

                    self.receive_state = ReceiveState::reading_payload(parsed);
                }

                ReceiveState::ReadingPayload {
                    header,
                    payload,
                    bytes_read,
                } => {
                    while *bytes_read < payload.len() {
                        let n = self.reader.read(&mut payload[*bytes_read..]).await?;
                        if n == 0 {
                            self.receive_state = ReceiveState::reading_header();
                            return Err(WireError::TruncatedInput);
                        }
                        *bytes_read += n;
                    }

                    let envelope = Envelope {
                        magic: header.magic,
                        command: header.command,
                        length: header.length,
                        checksum: header.checksum,
                        payload: std::mem::take(payload),
                    };

                    self.receive_state = ReceiveState::reading_header();
                    return Ok(envelope);
                }
            }
        }
    }
}

/// Writes envelopes to a byte stream for a single network.
#[derive(Debug, Clone)]
pub struct EnvelopeWriter<W> {
    /// The bitcoin network magic bytes.
    network_magic: Magic,
    /// The IO writer.
    writer: W,
}

impl<W> EnvelopeWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a new writer for the specified network magic.
    pub fn new(network_magic: Magic, writer: W) -> Self {
        Self {
            network_magic,
            writer,
        }
    }

    /// Frame and send a payload.
    pub async fn send(&mut self, command: Command, payload: Vec<u8>) -> Result<(), WireError> {
        let envelope = Envelope::new(self.network_magic, command, payload);
        self.write(&envelope).await
    }

    /// Write an already framed envelope.
    pub async fn write(&mut self, envelope: &Envelope) -> Result<(), WireError> {
        if envelope.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::MessageTooLarge(envelope.length));
        }

        self.writer.write_all(&envelope.encode()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode;
    use bitcoin::p2p::message::{NetworkMessage, RawNetworkMessage};
    use std::time::Duration;
    use tokio_test::io::Builder as MockIoBuilder;

    fn header_bytes(magic: Magic, command: &str, length: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic.to_bytes());
        bytes.extend_from_slice(Command::new(command).as_bytes());
        bytes.extend_from_slice(&length.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes
    }

    #[test]
    fn test_empty_payload_checksum() {
        assert_eq!(checksum(&[]), [0x5D, 0xF6, 0xE0, 0xE2]);
    }

    #[test]
    fn test_command_padding_and_truncation() {
        assert_eq!(
            Command::VERSION.as_bytes(),
            b"version\0\0\0\0\0"
        );
        assert_eq!(Command::VERSION.as_str(), "version");

        let long = Command::new("averyverylongcommand");
        assert_eq!(long.as_bytes(), b"averyverylon");
        assert_eq!(long.as_str(), "averyverylon");
    }

    #[test]
    fn test_encode_layout() {
        let envelope = Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![1, 2, 3]);
        let bytes = envelope.encode();

        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(&bytes[0..4], &[0xF9, 0xBE, 0xB4, 0xD9]);
        assert_eq!(&bytes[4..16], b"ping\0\0\0\0\0\0\0\0");
        assert_eq!(&bytes[16..20], &[3, 0, 0, 0]);
        assert_eq!(&bytes[20..24], &checksum(&[1, 2, 3]));
        assert_eq!(&bytes[24..], &[1, 2, 3]);
    }

    #[test]
    fn test_verack_matches_bitcoin_serialization() {
        let ours = Envelope::new(Magic::BITCOIN, Command::VERACK, Vec::new()).encode();
        let theirs = encode::serialize(&RawNetworkMessage::new(
            Magic::BITCOIN,
            NetworkMessage::Verack,
        ));

        assert_eq!(ours, theirs);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let payload = b"arbitrary payload".to_vec();
        let sent = Envelope::new(Magic::SIGNET, Command::new("custom"), payload.clone());
        let bytes = sent.encode();

        let mut reader = EnvelopeReader::new(&bytes[..]);
        let received = reader.read().await.unwrap();

        assert_eq!(received.magic(), Magic::SIGNET);
        assert_eq!(received.command().as_str(), "custom");
        assert_eq!(received.length() as usize, payload.len());
        assert_eq!(received.payload(), &payload[..]);
        assert_eq!(received.checksum(), checksum(&payload));
        assert!(received.verify_checksum());
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_zero_length_payload() {
        let bytes = Envelope::new(Magic::BITCOIN, Command::VERACK, Vec::new()).encode();
        let mock_reader = MockIoBuilder::new().read(&bytes).build();
        let mut reader = EnvelopeReader::new(mock_reader);

        let received = reader.read().await.unwrap();
        assert_eq!(received.command(), Command::VERACK);
        assert_eq!(received.length(), 0);
        assert!(received.payload().is_empty());
        assert!(received.verify_checksum());
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let header = header_bytes(Magic::BITCOIN, "block", 17_000_000);
        // Only the header is scripted, reading any payload would surface as truncation.
        let mock_reader = MockIoBuilder::new().read(&header).build();
        let mut reader = EnvelopeReader::new(mock_reader);

        let result = reader.read().await;
        assert!(matches!(result, Err(WireError::MessageTooLarge(17_000_000))));
    }

    #[tokio::test]
    async fn test_max_payload_size_is_accepted() {
        let header = header_bytes(Magic::BITCOIN, "block", MAX_PAYLOAD_SIZE as u32);
        let mock_reader = MockIoBuilder::new().read(&header).build();
        let mut reader = EnvelopeReader::new(mock_reader);

        // Passes the size check, then runs out of payload bytes.
        let result = reader.read().await;
        assert!(matches!(result, Err(WireError::TruncatedInput)));
    }

    #[tokio::test]
    async fn test_eof_during_header() {
        let partial = vec![0u8; 10];
        let mock_reader = MockIoBuilder::new().read(&partial).build();
        let mut reader = EnvelopeReader::new(mock_reader);

        let result = reader.read().await;
        assert!(matches!(result, Err(WireError::TruncatedInput)));
    }

    #[tokio::test]
    async fn test_eof_during_payload() {
        let mut bytes = Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![0; 8]).encode();
        bytes.truncate(HEADER_SIZE + 2);
        let mock_reader = MockIoBuilder::new().read(&bytes).build();
        let mut reader = EnvelopeReader::new(mock_reader);

        let result = reader.read().await;
        assert!(matches!(result, Err(WireError::TruncatedInput)));
    }

    #[tokio::test]
    async fn test_clean_close_between_messages() {
        let mock_reader = MockIoBuilder::new().build();
        let mut reader = EnvelopeReader::new(mock_reader);

        let result = reader.read().await;
        assert!(matches!(result, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_checksum_is_not_verified_by_reader() {
        let mut bytes = Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![7; 8]).encode();
        bytes[20] ^= 0xFF;
        let mut reader = EnvelopeReader::new(&bytes[..]);

        let received = reader.read().await.unwrap();
        assert!(!received.verify_checksum());
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let bytes = Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![9; 8]).encode();

        let mut mock_reader = MockIoBuilder::new();
        for i in 0..bytes.len() {
            mock_reader.read(&bytes[i..i + 1]);
        }
        let mut reader = EnvelopeReader::new(mock_reader.build());

        let received = reader.read().await.unwrap();
        assert_eq!(received.payload(), &[9; 8]);
    }

    #[tokio::test]
    async fn test_multiple_envelopes() {
        let first = Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![1; 8]);
        let second = Envelope::new(Magic::BITCOIN, Command::new("pong"), vec![2; 8]);
        let mut combined = first.encode();
        combined.extend_from_slice(&second.encode());

        let mut reader = EnvelopeReader::new(&combined[..]);
        assert_eq!(reader.read().await.unwrap(), first);
        assert_eq!(reader.read().await.unwrap(), second);
        assert!(matches!(
            reader.read().await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_send() {
        let mut writer = EnvelopeWriter::new(Magic::REGTEST, Vec::new());
        writer.send(Command::new("ping"), vec![4; 8]).await.unwrap();

        let expected = Envelope::new(Magic::REGTEST, Command::new("ping"), vec![4; 8]).encode();
        assert_eq!(writer.writer, expected);
    }

    #[tokio::test]
    async fn test_writer_refuses_oversized_payload() {
        let envelope = Envelope::new(
            Magic::BITCOIN,
            Command::new("block"),
            vec![0; MAX_PAYLOAD_SIZE + 1],
        );
        assert_eq!(envelope.length() as usize, MAX_PAYLOAD_SIZE + 1);

        let mut writer = EnvelopeWriter::new(Magic::BITCOIN, Vec::new());
        assert!(matches!(
            writer.write(&envelope).await,
            Err(WireError::MessageTooLarge(_))
        ));
        assert!(writer.writer.is_empty());
    }

    #[tokio::test]
    async fn test_read_resumes_after_cancellation() {
        let envelope = Envelope::new(Magic::BITCOIN, Command::new("inv"), vec![7; 37]);
        let bytes = envelope.encode();
        let (local, mut remote) = tokio::io::duplex(1024);
        let mut reader = EnvelopeReader::new(local);

        // Cancelled inside the header.
        remote.write_all(&bytes[..10]).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), reader.read())
                .await
                .is_err()
        );

        // Cancelled inside the payload.
        remote.write_all(&bytes[10..HEADER_SIZE + 5]).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), reader.read())
                .await
                .is_err()
        );

        remote.write_all(&bytes[HEADER_SIZE + 5..]).await.unwrap();
        assert_eq!(reader.read().await.unwrap(), envelope);
    }
}
