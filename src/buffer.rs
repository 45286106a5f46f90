use heapless::Deque;

/// Fixed capacity FIFO byte queue.
///
/// Writes beyond the capacity are rejected byte by byte, stored data is never
/// overwritten. Reads only ever yield bytes that were previously written, in
/// write order.
pub(crate) struct ByteRing<const N: usize> {
    queue: Deque<u8, N>,
}

impl<const N: usize> ByteRing<N> {
    pub const fn new() -> Self {
        Self { queue: Deque::new() }
    }

    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        self.queue.push_back(byte)
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    /// Next byte without removing it.
    pub fn peek(&self) -> Option<u8> {
        self.queue.front().copied()
    }

    /// Appends as much of `data` as fits and returns the number of bytes taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let mut taken = 0;
        for &byte in data {
            if self.queue.push_back(byte).is_err() {
                break;
            }
            taken += 1;
        }
        taken
    }

    /// Moves up to `destination.len()` bytes out and returns the number moved.
    pub fn drain(&mut self, destination: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in destination.iter_mut() {
            match self.queue.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
