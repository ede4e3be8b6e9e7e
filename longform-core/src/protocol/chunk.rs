//! Splitting a payload into write-sized windows.

use crate::error::EncodingError;

/// One `[offset, offset + len)` slice of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub offset: usize,
    pub len: usize,
}

impl ChunkWindow {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// Payload bytes that fit in one write after the frame header and the
/// per-write overhead.
pub fn window_size(negotiated: usize, header: usize, overhead: usize) -> Result<usize, EncodingError> {
    match negotiated.checked_sub(header + overhead) {
        Some(size) if size > 0 => Ok(size),
        _ => Err(EncodingError::WindowTooSmall {
            negotiated,
            header,
            overhead,
        }),
    }
}

/// Iterator over the windows covering `[0, total)` in order.
#[derive(Debug, Clone)]
pub struct ChunkWindows {
    next: usize,
    total: usize,
    size: usize,
}

impl ChunkWindows {
    /// Window length used for every window but possibly the last.
    pub fn window_len(&self) -> usize {
        self.size
    }
}

impl Iterator for ChunkWindows {
    type Item = ChunkWindow;

    fn next(&mut self) -> Option<ChunkWindow> {
        if self.next >= self.total {
            return None;
        }
        let len = self.size.min(self.total - self.next);
        let window = ChunkWindow {
            offset: self.next,
            len,
        };
        self.next += len;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.total - self.next).div_ceil(self.size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkWindows {}

/// Windows of at most `negotiated - header - overhead` bytes covering
/// `[0, total)` exactly once.
pub fn chunk_windows(
    negotiated: usize,
    header: usize,
    overhead: usize,
    total: usize,
) -> Result<ChunkWindows, EncodingError> {
    Ok(ChunkWindows {
        next: 0,
        total,
        size: window_size(negotiated, header, overhead)?,
    })
}
