//! FIFO ring buffer used for delay lines and stretcher streams.

/// Ring buffer with explicit capacity.
///
/// Nothing allocates after construction unless [`RingBuffer::grow`] is
/// called. Copies are split into at most two contiguous runs.
#[derive(Debug, Clone)]
pub struct RingBuffer<T>
where
    T: Copy + Default,
{
    data: Vec<T>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> RingBuffer<T>
where
    T: Copy + Default,
{
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: vec![T::default(); cap],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Returns the number of elements currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns available free space.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Ensures room for at least `capacity` elements, keeping the stored
    /// sequence in order.
    pub fn grow(&mut self, capacity: usize) {
        if capacity <= self.capacity() {
            return;
        }
        let mut data = vec![T::default(); capacity];
        let stored = self.peek_slice(&mut data);
        self.data = data;
        self.head = 0;
        self.len = stored;
        self.tail = stored % capacity;
    }

    /// Discards up to `n` elements from the front.
    ///
    /// Returns the number of elements discarded.
    pub fn discard(&mut self, n: usize) -> usize {
        let to_drop = n.min(self.len);
        if to_drop == 0 || self.capacity() == 0 {
            return 0;
        }
        self.head = (self.head + to_drop) % self.capacity();
        self.len -= to_drop;
        if self.len == 0 {
            self.head = 0;
            self.tail = 0;
        }
        to_drop
    }

    /// Copies elements from the front into `out` without removing them.
    ///
    /// Returns the number of copied elements.
    pub fn peek_slice(&self, out: &mut [T]) -> usize {
        let to_copy = out.len().min(self.len);
        if to_copy == 0 || self.capacity() == 0 {
            return 0;
        }

        let first = to_copy.min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        let second = to_copy - first;
        if second > 0 {
            out[first..first + second].copy_from_slice(&self.data[..second]);
        }
        to_copy
    }

    /// Pushes as many items as fit from `input`.
    ///
    /// Returns the number of items pushed.
    pub fn push_slice(&mut self, input: &[T]) -> usize {
        if input.is_empty() || self.capacity() == 0 || self.available() == 0 {
            return 0;
        }
        let to_push = input.len().min(self.available());
        let first = to_push.min(self.capacity() - self.tail);
        self.data[self.tail..self.tail + first].copy_from_slice(&input[..first]);
        self.tail = (self.tail + first) % self.capacity();

        let second = to_push - first;
        if second > 0 {
            self.data[..second].copy_from_slice(&input[first..first + second]);
            self.tail = second;
        }

        self.len += to_push;
        to_push
    }

    /// Pushes up to `n` default values (silence for samples).
    ///
    /// Returns the number of items pushed.
    pub fn push_default(&mut self, n: usize) -> usize {
        let to_push = n.min(self.available());
        if to_push == 0 {
            return 0;
        }
        let first = to_push.min(self.capacity() - self.tail);
        self.data[self.tail..self.tail + first].fill(T::default());
        self.tail = (self.tail + first) % self.capacity();

        let second = to_push - first;
        if second > 0 {
            self.data[..second].fill(T::default());
            self.tail = second;
        }

        self.len += to_push;
        to_push
    }

    /// Pops as many items as available into `output`.
    ///
    /// Returns the number of items popped.
    pub fn pop_slice(&mut self, output: &mut [T]) -> usize {
        if output.is_empty() || self.capacity() == 0 || self.len == 0 {
            return 0;
        }
        let to_pop = output.len().min(self.len);
        let first = to_pop.min(self.capacity() - self.head);
        output[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        self.head = (self.head + first) % self.capacity();

        let second = to_pop - first;
        if second > 0 {
            output[first..first + second].copy_from_slice(&self.data[..second]);
            self.head = second;
        }

        self.len -= to_pop;
        if self.len == 0 {
            self.head = 0;
            self.tail = 0;
        }
        to_pop
    }
}
