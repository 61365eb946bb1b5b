use std::io::{self, SeekFrom};

/// Decrypted contents of an open file plus a cursor.
///
/// Engines decrypt a file once on open, serve reads and writes from here, and
/// re-encrypt on flush when [`PlaintextBuffer::is_dirty`] is set.
#[derive(Debug, Default)]
pub struct PlaintextBuffer {
    data: Vec<u8>,
    pos: u64,
    dirty: bool,
}

impl PlaintextBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            dirty: false,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let start = self.pos.min(self.len()) as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        n
    }

    /// Largest file a handle will grow to. Whole bodies are held in memory.
    pub const MAX_LEN: u64 = 1 << 30;

    /// Writes at the cursor (or at the end when `append` is set). Writing past
    /// the end zero-fills the gap.
    pub fn write(&mut self, buf: &[u8], append: bool) -> io::Result<usize> {
        if append {
            self.pos = self.len();
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let end = self.pos.checked_add(buf.len() as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "write offset overflows")
        })?;
        if end > Self::MAX_LEN || usize::try_from(end).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::FileTooLarge,
                "write would grow the file past the size limit",
            ));
        }
        let (start, end) = (self.pos as usize, end as usize);
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        self.dirty = true;
        Ok(buf.len())
    }

    pub fn truncate(&mut self) {
        if !self.data.is_empty() {
            self.data.clear();
            self.dirty = true;
        }
        self.pos = 0;
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_seek() {
        let mut buf = PlaintextBuffer::new(b"0123456789".to_vec());
        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 4);
        assert_eq!(&out, b"0123");

        buf.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(&out[..2], b"89");
        assert_eq!(buf.read(&mut out), 0);
        assert!(!buf.is_dirty());

        buf.seek(SeekFrom::Start(12)).unwrap();
        buf.write(b"xy", false).unwrap();
        assert_eq!(buf.as_slice(), b"0123456789\0\0xy");
        assert!(buf.is_dirty());
    }

    #[test]
    fn test_append_ignores_cursor() {
        let mut buf = PlaintextBuffer::new(b"abc".to_vec());
        buf.seek(SeekFrom::Start(0)).unwrap();
        buf.write(b"def", true).unwrap();
        assert_eq!(buf.as_slice(), b"abcdef");
    }

    #[test]
    fn test_negative_seek_rejected() {
        let mut buf = PlaintextBuffer::new(b"abc".to_vec());
        let err = buf.seek(SeekFrom::Current(-5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_write_far_past_end_is_refused() {
        let mut buf = PlaintextBuffer::new(b"abc".to_vec());

        buf.seek(SeekFrom::Start(u64::MAX - 1)).unwrap();
        let err = buf.write(b"abcd", false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        buf.seek(SeekFrom::Start(1 << 40)).unwrap();
        let err = buf.write(b"x", false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::FileTooLarge);

        buf.seek(SeekFrom::Start(PlaintextBuffer::MAX_LEN)).unwrap();
        assert!(buf.write(b"x", false).is_err());
        assert_eq!(buf.write(b"", false).unwrap(), 0);

        // Crossing the limit by one byte is enough to refuse
        let mut edge = PlaintextBuffer::default();
        edge.seek(SeekFrom::Start(PlaintextBuffer::MAX_LEN - 1)).unwrap();
        assert!(edge.write(b"xy", false).is_err());

        assert_eq!(buf.as_slice(), b"abc");
        assert!(!buf.is_dirty());
    }
}
