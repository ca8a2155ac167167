use std::io::{Result, Write};

/// Forwards bytes to `inner`, inserting `prefix` at the start of every line.
pub struct LinePrefixer<'a, W: Write> {
    inner: W,
    prefix: &'a [u8],
    at_line_start: bool,
    // Bytes forwarded, prefixes included
    pub counted: u64,
}

impl<'a, W: Write> LinePrefixer<'a, W> {
    pub fn new(inner: W, prefix: &'a [u8]) -> Self {
        Self {
            inner,
            prefix,
            at_line_start: true,
            counted: 0,
        }
    }

    /// Terminate a trailing partial line so the next block starts clean.
    pub fn finish(mut self) -> Result<W> {
        if !self.at_line_start {
            self.inner.write_all(b"\n")?;
            self.counted += 1;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<'a, W: Write> Write for LinePrefixer<'a, W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        for line in buf.split_inclusive(|b| *b == b'\n') {
            if self.at_line_start {
                self.inner.write_all(self.prefix)?;
                self.counted += self.prefix.len() as u64;
            }
            self.inner.write_all(line)?;
            self.counted += line.len() as u64;
            self.at_line_start = line.ends_with(b"\n");
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_across_writes() {
        let mut out = Vec::new();
        {
            let mut w = LinePrefixer::new(&mut out, b"#");
            w.write_all(b"HTAR: one\nHTAR: t").unwrap();
            w.write_all(b"wo\n\nlast").unwrap();
            w.finish().unwrap();
        }
        assert_eq!(out, b"#HTAR: one\n#HTAR: two\n#\n#last\n");
    }
}
