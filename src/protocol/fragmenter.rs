//! Splitting outgoing message payloads into frames (RFC 6455 §5.4).

use crate::protocol::OpCode;

/// One outgoing frame produced by [`MessageFragmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Message opcode on the first fragment, `Continuation` afterwards.
    pub opcode: OpCode,
    /// Set on the last fragment.
    pub fin: bool,
    /// Slice of the message payload.
    pub payload: &'a [u8],
}

impl Fragment<'_> {
    /// Whether this is the first fragment of its message.
    #[inline]
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.opcode != OpCode::Continuation
    }
}

/// Iterator that splits a payload into fragments of at most
/// `fragment_size` bytes.
///
/// An empty payload still yields one final fragment.
#[derive(Debug, Clone)]
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> MessageFragmenter<'a> {
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Whether the payload needs more than one frame.
    #[inline]
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }

    /// Bytes not yet yielded.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.offset)
    }
}

impl<'a> Iterator for MessageFragmenter<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            if self.is_first {
                self.is_first = false;
                return Some(Fragment {
                    opcode: self.opcode,
                    fin: true,
                    payload: &[],
                });
            }
            return None;
        }

        let chunk_size = self.remaining().min(self.fragment_size);
        let payload = &self.payload[self.offset..self.offset + chunk_size];
        self.offset += chunk_size;

        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Fragment {
            opcode,
            fin: self.offset >= self.payload.len(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fragmentation_needed() {
        let frag = MessageFragmenter::new(b"Hello", OpCode::Text, 1024);
        assert!(!frag.needs_fragmentation());

        let frames: Vec<_> = frag.collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].is_first());
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert_eq!(frames[0].payload, b"Hello");
    }

    #[test]
    fn test_exact_fragmentation() {
        let payload = vec![0xAB; 30];
        let frag = MessageFragmenter::new(&payload, OpCode::Binary, 10);
        assert!(frag.needs_fragmentation());

        let frames: Vec<_> = frag.collect();
        assert_eq!(frames.len(), 3);

        assert!(!frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Binary);

        assert!(!frames[1].fin);
        assert_eq!(frames[1].opcode, OpCode::Continuation);

        assert!(frames[2].fin);
        assert_eq!(frames[2].opcode, OpCode::Continuation);
        assert!(frames.iter().all(|f| f.payload.len() == 10));
    }

    #[test]
    fn test_uneven_fragmentation() {
        let payload: Vec<u8> = (0..25).collect();
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 10).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].payload, &payload[20..]);
        assert!(frames[2].fin);

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload.iter().copied()).collect();
        assert_eq!(joined, payload);
    }

    #[test]
    fn test_empty_payload() {
        let frames: Vec<_> = MessageFragmenter::new(b"", OpCode::Text, 1024).collect();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_payload_equals_fragment_size() {
        let payload = vec![0xEF; 100];
        let frag = MessageFragmenter::new(&payload, OpCode::Binary, 100);
        assert!(!frag.needs_fragmentation());

        let frames: Vec<_> = frag.collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
    }

    #[test]
    fn test_zero_fragment_size_is_one_byte() {
        let frames: Vec<_> = MessageFragmenter::new(b"abc", OpCode::Binary, 0).collect();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_remaining_bytes() {
        let payload = vec![0xAB; 30];
        let mut frag = MessageFragmenter::new(&payload, OpCode::Binary, 10);

        assert_eq!(frag.remaining(), 30);
        frag.next();
        assert_eq!(frag.remaining(), 20);
        frag.next();
        frag.next();
        assert_eq!(frag.remaining(), 0);
        assert!(frag.next().is_none());
    }
}
