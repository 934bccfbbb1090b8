//! Forward-only zip compression and extraction decorators
//!
//! [`ZipOutputStream`] compresses its source into a single-entry archive while
//! it is read, without ever seeking back: the entry is written with a data
//! descriptor (general purpose flag bit 3) so crc and sizes can follow the
//! compressed data instead of being patched into the local header.
//! [`ZipInputStream`] extracts the first entry of an archive; locating that
//! entry requires random access to reach the central directory, so a
//! forward-only payload must be adapted through [`SeekableReadStream`] first.

use crate::error::{Result, SluiceError};
use crate::io::{Backlog, BufferController, SeekableReadStream, Stream};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::io::{self, Read, Seek, SeekFrom, Take, Write};
use zip::{CompressionMethod, ZipArchive};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;

// bit 3: sizes in the data descriptor; bit 11: UTF-8 entry name
const ENTRY_FLAGS: u16 = 0x0808;
const METHOD_DEFLATED: u16 = 8;
const VERSION_NEEDED: u16 = 20;
const DATA_DESCRIPTOR_LEN: u64 = 16;

/// Default number of source bytes pulled per compression step.
pub const DEFAULT_ZIP_CHUNK_SIZE: usize = 4 * 1024;

enum InputState<R: Read + Seek> {
    Start(R),
    Deflated(DeflateDecoder<Take<R>>),
    Stored(Take<R>),
    Done,
}

/// Decompresses the first entry of a zip archive while it is read.
///
/// The archive source must support seeking so the central directory can be
/// located; wrap forward-only sources with [`ZipInputStream::from_unseekable`].
/// Once the entry is exhausted the remaining archive bytes (data descriptor,
/// central directory) are drained from the source so an enclosing decorator
/// observes true source exhaustion.
pub struct ZipInputStream<R: Read + Seek> {
    state: InputState<R>,
    entry_name: Option<String>,
}

impl<R: Read + Seek> ZipInputStream<R> {
    /// Wrap a seekable archive. The entry is opened lazily on the first read.
    pub fn new(source: R) -> Self {
        Self {
            state: InputState::Start(source),
            entry_name: None,
        }
    }

    /// Name of the extracted entry, known once reading has started.
    pub fn entry_name(&self) -> Option<&str> {
        self.entry_name.as_deref()
    }

    fn open(&mut self) -> Result<()> {
        let InputState::Start(source) = std::mem::replace(&mut self.state, InputState::Done)
        else {
            return Ok(());
        };
        let mut archive = ZipArchive::new(source)?;
        if archive.is_empty() {
            return Err(SluiceError::MalformedInput(
                "archive holds no entry".to_owned(),
            ));
        }
        let (method, compressed_size, data_start, name) = {
            let entry = archive.by_index_raw(0)?;
            (
                entry.compression(),
                entry.compressed_size(),
                entry.data_start(),
                entry.name().to_owned(),
            )
        };
        log::debug!("extracting zip entry {name:?}, {compressed_size} compressed bytes");
        let mut source = archive.into_inner();
        source.seek(SeekFrom::Start(data_start))?;
        let limited = source.take(compressed_size);
        self.entry_name = Some(name);
        self.state = match method {
            CompressionMethod::Deflated => InputState::Deflated(DeflateDecoder::new(limited)),
            CompressionMethod::Stored => InputState::Stored(limited),
            other => {
                return Err(SluiceError::MalformedInput(format!(
                    "unsupported compression method {other:?}"
                )))
            }
        };
        Ok(())
    }

    /// Entry content fully delivered: read the source to its true end so the
    /// trailing archive records are consumed too.
    fn finish(&mut self) -> io::Result<()> {
        let mut source = match std::mem::replace(&mut self.state, InputState::Done) {
            InputState::Deflated(decoder) => decoder.into_inner().into_inner(),
            InputState::Stored(limited) => limited.into_inner(),
            _ => return Ok(()),
        };
        let mut scratch = [0u8; 8 * 1024];
        while source.read(&mut scratch)? > 0 {}
        Ok(())
    }
}

impl<R: Read> ZipInputStream<SeekableReadStream<R>> {
    /// Wrap a forward-only archive source behind a seekable adapter.
    pub fn from_unseekable(source: R) -> Self {
        Self::new(SeekableReadStream::new(source))
    }
}

impl<R: Read + Seek> Read for ZipInputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = match &mut self.state {
                InputState::Start(_) => {
                    self.open().map_err(SluiceError::into_io)?;
                    continue;
                }
                InputState::Deflated(decoder) => decoder.read(buf)?,
                InputState::Stored(limited) => limited.read(buf)?,
                InputState::Done => return Ok(0),
            };
            if n == 0 && !buf.is_empty() {
                self.finish()?;
            }
            return Ok(n);
        }
    }
}

impl<R: Read + Seek> Stream for ZipInputStream<R> {}

/// Compresses its source into a single-entry zip archive while it is read.
///
/// Forward-only by construction: header, compressed data, data descriptor,
/// central directory and end record are produced strictly in file order.
pub struct ZipOutputStream<S: Read> {
    source: S,
    entry_name: String,
    chunk: Vec<u8>,
    encoder: DeflateEncoder<Vec<u8>>,
    crc: Crc,
    compressed: u64,
    header_emitted: bool,
    finalized: bool,
    backlog: Backlog,
}

impl<S: Read> ZipOutputStream<S> {
    /// Compress `source` into an archive whose single entry is `entry_name`.
    pub fn new(source: S, entry_name: impl Into<String>) -> Result<Self> {
        Self::with_chunk_size(source, entry_name, DEFAULT_ZIP_CHUNK_SIZE)
    }

    /// Like [`ZipOutputStream::new`] with an explicit compression chunk size.
    pub fn with_chunk_size(
        source: S,
        entry_name: impl Into<String>,
        chunk_size: usize,
    ) -> Result<Self> {
        let entry_name = entry_name.into();
        if entry_name.is_empty() {
            return Err(SluiceError::InvalidArgument(
                "zip entry name must not be empty".to_owned(),
            ));
        }
        if chunk_size == 0 {
            return Err(SluiceError::InvalidArgument(
                "zip chunk size must be positive".to_owned(),
            ));
        }
        Ok(Self {
            source,
            entry_name,
            chunk: vec![0u8; chunk_size],
            encoder: DeflateEncoder::new(Vec::new(), Compression::default()),
            crc: Crc::new(),
            compressed: 0,
            header_emitted: false,
            finalized: false,
            backlog: Backlog::new(),
        })
    }

    /// Name of the archive's single entry.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    fn header_len(&self) -> u64 {
        30 + self.entry_name.len() as u64
    }

    fn local_header(&self) -> Vec<u8> {
        let name = self.entry_name.as_bytes();
        let mut header = Vec::with_capacity(30 + name.len());
        header.extend_from_slice(&LOCAL_HEADER_SIG.to_le_bytes());
        header.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        header.extend_from_slice(&ENTRY_FLAGS.to_le_bytes());
        header.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // mod time
        header.extend_from_slice(&0u16.to_le_bytes()); // mod date
        header.extend_from_slice(&0u32.to_le_bytes()); // crc, deferred to descriptor
        header.extend_from_slice(&0u32.to_le_bytes()); // compressed size, deferred
        header.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size, deferred
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        header.extend_from_slice(name);
        header
    }

    /// Flush the codec and emit descriptor, central directory and end record.
    fn trailer(&mut self) -> io::Result<Vec<u8>> {
        self.encoder.try_finish()?;
        let mut out = std::mem::take(self.encoder.get_mut());
        self.compressed += out.len() as u64;

        let crc = self.crc.sum();
        let uncompressed = self.crc.amount();
        let compressed = self.compressed as u32;
        let name = self.entry_name.as_bytes();

        out.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&compressed.to_le_bytes());
        out.extend_from_slice(&uncompressed.to_le_bytes());

        let central_dir_offset = (self.header_len() + self.compressed + DATA_DESCRIPTOR_LEN) as u32;
        let central_dir_len = 46 + name.len() as u32;

        out.extend_from_slice(&CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // version made by
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&ENTRY_FLAGS.to_le_bytes());
        out.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&compressed.to_le_bytes());
        out.extend_from_slice(&uncompressed.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        out.extend_from_slice(&0u32.to_le_bytes()); // external attributes
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(name);

        out.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // this disk
        out.extend_from_slice(&0u16.to_le_bytes()); // central directory disk
        out.extend_from_slice(&1u16.to_le_bytes()); // entries on this disk
        out.extend_from_slice(&1u16.to_le_bytes()); // total entries
        out.extend_from_slice(&central_dir_len.to_le_bytes());
        out.extend_from_slice(&central_dir_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length

        log::debug!(
            "zip entry {:?} finalized, {} bytes in, {} bytes compressed",
            self.entry_name,
            uncompressed,
            self.compressed
        );
        Ok(out)
    }

    fn produce(&mut self, controller: &mut BufferController<'_>) -> io::Result<()> {
        if !self.header_emitted {
            self.header_emitted = true;
            let header = self.local_header();
            controller.append(&header, &mut self.backlog);
            return Ok(());
        }
        let n = self.source.read(&mut self.chunk)?;
        if n > 0 {
            self.crc.update(&self.chunk[..n]);
            self.encoder.write_all(&self.chunk[..n])?;
            let produced = std::mem::take(self.encoder.get_mut());
            self.compressed += produced.len() as u64;
            controller.append(&produced, &mut self.backlog);
        } else {
            self.finalized = true;
            let trailer = self.trailer()?;
            controller.append(&trailer, &mut self.backlog);
        }
        Ok(())
    }
}

impl<S: Read> Read for ZipOutputStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut controller = BufferController::new(buf);
        controller.drain_backlog(&mut self.backlog);
        while controller.availability() > 0 && !self.finalized {
            self.produce(&mut controller)?;
        }
        Ok(controller.count())
    }
}

impl<S: Read> Stream for ZipOutputStream<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn read_all<R: Read>(stream: &mut R, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn compress(payload: &[u8], chunk: usize) -> Vec<u8> {
        let mut stream =
            ZipOutputStream::new(Cursor::new(payload.to_vec()), "payload.xml").unwrap();
        read_all(&mut stream, chunk)
    }

    #[test]
    fn rejects_empty_entry_name_and_zero_chunk() {
        assert!(matches!(
            ZipOutputStream::new(Cursor::new(Vec::new()), ""),
            Err(SluiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            ZipOutputStream::with_chunk_size(Cursor::new(Vec::new()), "e", 0),
            Err(SluiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn emits_a_local_header_first() {
        let archive = compress(b"hello", 4096);
        assert_eq!(&archive[..4], &LOCAL_HEADER_SIG.to_le_bytes());
    }

    #[test]
    fn round_trips_through_the_input_stream() {
        let payload = b"some payload that deflate can chew on, repeated a little, \
                        some payload that deflate can chew on";
        let archive = compress(payload, 4096);

        let mut input = ZipInputStream::new(Cursor::new(archive));
        let content = read_all(&mut input, 64);
        assert_eq!(content, payload);
        assert_eq!(input.entry_name(), Some("payload.xml"));
    }

    #[test]
    fn archive_is_readable_by_a_standard_extractor() {
        let payload: Vec<u8> = (0..20_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let archive = compress(&payload, 1024);

        let mut extractor = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut entry = extractor.by_index(0).unwrap();
        assert_eq!(entry.name(), "payload.xml");
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, payload);
    }

    #[test]
    fn output_bytes_do_not_depend_on_read_chunk_size() {
        let payload = b"chunking must never change the produced archive bytes";
        let reference = compress(payload, 4096);
        for chunk in [1usize, 3, 7, 32, 257] {
            assert_eq!(compress(payload, chunk), reference, "chunk size {chunk}");
        }
    }

    #[test]
    fn empty_payload_round_trips() {
        let archive = compress(b"", 64);
        let mut input = ZipInputStream::new(Cursor::new(archive));
        assert!(read_all(&mut input, 16).is_empty());
    }

    #[test]
    fn extracts_stored_entries_too() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("stored.bin", options).unwrap();
        writer.write_all(b"kept as-is").unwrap();
        let archive = writer.finish().unwrap().into_inner();

        let mut input = ZipInputStream::new(Cursor::new(archive));
        assert_eq!(read_all(&mut input, 8), b"kept as-is");
    }

    #[test]
    fn unseekable_sources_are_adapted() {
        let archive = compress(b"forward only transport", 4096);
        // ReaderStream-like forward-only wrapper: plain Read without Seek
        struct Forward(Cursor<Vec<u8>>);
        impl Read for Forward {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.0.read(buf)
            }
        }

        let mut input = ZipInputStream::from_unseekable(Forward(Cursor::new(archive)));
        assert_eq!(read_all(&mut input, 16), b"forward only transport");
    }

    #[test]
    fn entry_exhaustion_drains_the_source() {
        let archive = compress(b"drained", 4096);
        let archive_len = archive.len() as u64;
        let mut cursor = Cursor::new(archive);

        {
            let mut input = ZipInputStream::new(&mut cursor);
            read_all(&mut input, 8);
        }
        // the trailing records were consumed, not abandoned mid-archive
        assert_eq!(cursor.position(), archive_len);
    }
}
