use quick_xml::{errors::IllFormedError, events::Event, NsReader};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};

use crate::{Command, DeError};

use super::AsyncClientConnection;

impl AsyncClientConnection for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn to_indi(self) -> (AsyncIndiWriter<Self::Write>, AsyncIndiReader<Self::Read>) {
        let (reader, writer) = self.into_split();
        (AsyncIndiWriter::new(writer), AsyncIndiReader::new(reader))
    }
}

impl AsyncClientConnection for DuplexStream {
    type Read = ReadHalf<DuplexStream>;
    type Write = WriteHalf<DuplexStream>;

    fn to_indi(self) -> (AsyncIndiWriter<Self::Write>, AsyncIndiReader<Self::Read>) {
        let (reader, writer) = tokio::io::split(self);
        (AsyncIndiWriter::new(writer), AsyncIndiReader::new(reader))
    }
}

/// Splits the incoming byte stream into one XML document per top-level INDI element.
pub struct AsyncIndiReader<T> {
    reader: NsReader<BufReader<T>>,
}

impl<T: AsyncRead + Unpin> AsyncIndiReader<T> {
    pub fn new(reader: T) -> AsyncIndiReader<T> {
        let mut reader = NsReader::from_reader(BufReader::new(reader));
        reader.config_mut().trim_text(true);
        AsyncIndiReader { reader }
    }

    /// Reads one complete top-level element.  An element that can't be copied is still
    /// consumed to its closing tag so the next read starts on a fresh element.
    async fn read_xml_document(&mut self) -> Option<Result<String, DeError>> {
        let mut buffer = Vec::new();
        let mut document = Vec::new();
        let mut depth: usize = 0;
        let mut failed: Option<DeError> = None;
        loop {
            let event = match self.reader.read_event_into_async(&mut buffer).await {
                Ok(e) => e,
                // The reader has already popped the element this tag was meant to close.
                Err(e @ quick_xml::Error::IllFormed(IllFormedError::MismatchedEndTag { .. }))
                    if depth > 0 =>
                {
                    depth -= 1;
                    failed.get_or_insert(e.into());
                    if depth == 0 {
                        return failed.map(Err);
                    }
                    buffer.clear();
                    continue;
                }
                Err(e) => return Some(Err(e.into())),
            };
            match event {
                Event::Start(e) => {
                    depth += 1;
                    if failed.is_none() {
                        match write_tag(&mut document, &e) {
                            Ok(()) => document.extend_from_slice(b">"),
                            Err(e) => failed = Some(e),
                        }
                    }
                }
                Event::Empty(e) => {
                    if failed.is_none() {
                        match write_tag(&mut document, &e) {
                            Ok(()) => document.extend_from_slice(b"/>"),
                            Err(e) => failed = Some(e),
                        }
                    }
                    if depth == 0 {
                        return Some(finish(document, failed));
                    }
                }
                Event::End(e) => {
                    let Some(remaining) = depth.checked_sub(1) else {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        return Some(Err(quick_xml::Error::IllFormed(
                            IllFormedError::UnmatchedEndTag(name),
                        )
                        .into()));
                    };
                    depth = remaining;
                    document.extend_from_slice(b"</");
                    document.extend_from_slice(e.name().as_ref());
                    document.extend_from_slice(b">");
                    if depth == 0 {
                        return Some(finish(document, failed));
                    }
                }
                Event::Text(e) if depth > 0 => {
                    document.extend_from_slice(&e.into_inner());
                }
                Event::Eof => return None,
                _ => {}
            }
            buffer.clear();
        }
    }

    /// Reads the next command from the server.  `None` once the connection is closed.
    pub async fn read(&mut self) -> Option<Result<Command, DeError>> {
        let doc = match self.read_xml_document().await? {
            Ok(doc) => doc,
            Err(e) => return Some(Err(e)),
        };
        Some(quick_xml::de::from_str::<Command>(&doc).map_err(Into::into))
    }
}

fn finish(document: Vec<u8>, failed: Option<DeError>) -> Result<String, DeError> {
    match failed {
        Some(e) => Err(e),
        None => Ok(String::from_utf8(document)?),
    }
}

fn write_tag(document: &mut Vec<u8>, e: &quick_xml::events::BytesStart) -> Result<(), DeError> {
    document.extend_from_slice(b"<");
    document.extend_from_slice(e.name().as_ref());
    for attr in e.attributes() {
        let attr = attr?;
        document.extend_from_slice(b" ");
        document.extend_from_slice(attr.key.as_ref());
        document.extend_from_slice(b"=\"");
        // Values stay escaped; only a bare double quote needs re-escaping.
        for b in attr.value.iter() {
            if *b == b'"' {
                document.extend_from_slice(b"&quot;");
            } else {
                document.push(*b);
            }
        }
        document.extend_from_slice(b"\"");
    }
    Ok(())
}

pub struct AsyncIndiWriter<T> {
    writer: T,
}

impl<T: AsyncWrite + Unpin> AsyncIndiWriter<T> {
    pub fn new(writer: T) -> AsyncIndiWriter<T> {
        AsyncIndiWriter { writer }
    }

    pub async fn write(&mut self, cmd: &Command) -> Result<(), DeError> {
        let buffer = quick_xml::se::to_string(cmd)?;
        self.writer.write_all(buffer.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DeError> {
        Ok(self.writer.shutdown().await?)
    }
}
