//! I/O utilities.
use std::io::prelude::*;

/// Combine a read-only stream and a write-only stream into one read-write stream.
pub struct ReadWriteAdapter<R: Read, W: Write> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> ReadWriteAdapter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: Read, W: Write> Read for ReadWriteAdapter<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, std::io::Error> {
        self.reader.read(buf)
    }
}
impl<R: Read, W: Write> Write for ReadWriteAdapter<R, W> {
    fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, std::io::Error> {
        self.writer.write(buf)
    }
    fn flush(&mut self) -> std::result::Result<(), std::io::Error> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_adapter_read() {
        let data = b"I love spaghetti";
        let mut adapter = ReadWriteAdapter::new(&data[..], vec![]);

        let mut buf = vec![0; 1024];
        let read_size = adapter.read(&mut buf).unwrap();
        assert_eq!(16, read_size);
        assert_eq!(data[..], buf[0..read_size]);
    }

    #[test]
    fn test_adapter_write() {
        let data = b"I love spaghetti";
        let readbuf = vec![];
        let mut writebuf = vec![0; 1024];

        let mut adapter = ReadWriteAdapter::new(&readbuf[..], &mut writebuf[..]);
        let write_size = adapter.write(&data[..]).unwrap();

        assert_eq!(16, write_size);
        assert_eq!(data[..], writebuf[0..write_size]);
    }
}
