use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::constants::MAX_FRAME_SIZE;
use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Header, Options};
use crate::transport::codec::{Codec, JsonCodec};

/// Type-erased read half of a connection (plain TCP or an HTTP tunnel).
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reads one length-prefixed frame.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`
///
/// # Errors
///
/// Returns an error if:
/// - Reading the length prefix fails (including a clean EOF)
/// - The frame exceeds [`MAX_FRAME_SIZE`]
/// - Reading the data fails
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;

    // Validate length to prevent allocation of excessively large buffers
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(len, MAX_FRAME_SIZE));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Appends one length-prefixed frame to `buf`.
fn push_frame(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(RpcError::MessageTooLarge(data.len(), MAX_FRAME_SIZE));
    }
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Sends the handshake options (always JSON, whatever codec they select).
pub async fn write_options<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, options: &Options) -> Result<()> {
    let encoded = JsonCodec::encode(options)?;
    let mut buf = Vec::with_capacity(encoded.len() + 4);
    push_frame(&mut buf, &encoded)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Receives the handshake options sent by [`write_options`].
pub async fn read_options<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Options> {
    let data = read_frame(reader).await?;
    serde_json::from_slice(&data).map_err(|e| RpcError::InvalidOption(e.to_string()))
}

/// Read half of a framed connection.
///
/// Yields headers and raw bodies in the order the peer wrote them. Bodies are
/// returned undecoded so the party that knows the target type can decode them.
pub struct FrameReader {
    reader: BoxedReader,
    codec: Codec,
}

impl FrameReader {
    pub fn new(reader: BoxedReader, codec: Codec) -> Self {
        Self { reader, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub async fn read_header(&mut self) -> Result<Header> {
        let data = read_frame(&mut self.reader).await?;
        self.codec.decode(&data)
    }

    /// Reads the body that follows the last header, still encoded.
    pub async fn read_body(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.reader).await
    }

    /// Reads and drops the body that follows the last header.
    pub async fn discard_body(&mut self) -> Result<()> {
        self.read_body().await.map(drop)
    }
}

/// Write half of a framed connection.
///
/// One `write` puts a header frame and its body frame on the wire with a
/// single buffer, so callers only need to serialize whole `write` calls.
pub struct FrameWriter {
    writer: BoxedWriter,
    codec: Codec,
}

impl FrameWriter {
    pub fn new(writer: BoxedWriter, codec: Codec) -> Self {
        Self { writer, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Writes `header` followed by an already-encoded `body`, then flushes.
    pub async fn write(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        let header = self.codec.encode(header)?;
        let mut buf = Vec::with_capacity(header.len() + body.len() + 8);
        push_frame(&mut buf, &header)?;
        push_frame(&mut buf, body)?;

        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts the write half down; the peer observes EOF.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CodecType;

    fn pipe(codec_type: CodecType) -> (FrameWriter, FrameReader) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let codec = Codec::new(codec_type);
        (
            FrameWriter::new(Box::new(client), codec),
            FrameReader::new(Box::new(server), codec),
        )
    }

    #[tokio::test]
    async fn test_header_and_body_arrive_in_order() {
        let (mut writer, mut reader) = pipe(CodecType::Json);
        let codec = writer.codec();

        writer.write(&Header::request("Foo.Sum", 1), &codec.encode(&(3, 4)).unwrap()).await.unwrap();
        writer.write(&Header::request("Foo.Sum", 2), &codec.encode(&(5, 6)).unwrap()).await.unwrap();

        for (seq, expected) in [(1, (3, 4)), (2, (5, 6))] {
            let header = reader.read_header().await.unwrap();
            assert_eq!(header.seq, seq);
            let body: (i32, i32) = codec.decode(&reader.read_body().await.unwrap()).unwrap();
            assert_eq!(body, expected);
        }
    }

    #[tokio::test]
    async fn test_discard_body_skips_to_next_header() {
        let (mut writer, mut reader) = pipe(CodecType::Postcard);
        let codec = writer.codec();

        writer.write(&Header::request("A.B", 1), &codec.encode("ignored").unwrap()).await.unwrap();
        writer.write(&Header::request("A.B", 2), &codec.encode("kept").unwrap()).await.unwrap();

        assert_eq!(reader.read_header().await.unwrap().seq, 1);
        reader.discard_body().await.unwrap();
        assert_eq!(reader.read_header().await.unwrap().seq, 2);
        let body: String = codec.decode(&reader.read_body().await.unwrap()).unwrap();
        assert_eq!(body, "kept");
    }

    #[tokio::test]
    async fn test_close_yields_connection_error() {
        let (mut writer, mut reader) = pipe(CodecType::Json);
        writer.close().await.unwrap();

        let err = reader.read_header().await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err, RpcError::MessageTooLarge(u32::MAX as usize, MAX_FRAME_SIZE));
    }

    #[tokio::test]
    async fn test_options_handshake() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let options = Options::default().with_codec(CodecType::Postcard);

        write_options(&mut client, &options).await.unwrap();
        assert_eq!(read_options(&mut server).await.unwrap(), options);
    }

    #[tokio::test]
    async fn test_malformed_options() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&3u32.to_be_bytes()).await.unwrap();
        client.write_all(b"{{{").await.unwrap();

        let err = read_options(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidOption(_)));
    }
}
