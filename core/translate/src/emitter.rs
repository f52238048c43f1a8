//! Append-only output buffer for emitted JavaScript source text.

/// Grows by doubling from a 32 KiB floor; no random-access edits.
/// Declarations that must precede code are staged in the translator's
/// per-body header vector and flushed here when the body closes.
#[derive(Debug)]
pub(crate) struct Emitter {
    buf: String,
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter {
            buf: String::with_capacity(32 * 1024),
        }
    }
}

impl Emitter {
    /// Appends one newline-terminated line assembled from `fragments`.
    pub(crate) fn line(&mut self, fragments: &[&str]) {
        for fragment in fragments {
            self.buf.push_str(fragment);
        }
        self.buf.push('\n');
    }

    pub(crate) fn push_raw(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    pub(crate) fn contents(&self) -> &str {
        &self.buf
    }
}
