/// One bit per field: byte `i / 8`, bit `i % 8`, so field 0 is `0x01`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyMask {
    bits: Vec<u8>,
    field_count: usize,
}

impl DirtyMask {
    pub fn new(field_count: usize) -> Self {
        Self {
            bits: vec![0; field_count.div_ceil(8)],
            field_count,
        }
    }

    /// Bits past `field_count` are kept so decoders can reject them.
    pub fn from_bytes(bytes: &[u8], field_count: usize) -> Self {
        Self {
            bits: bytes.to_vec(),
            field_count,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn mark(&mut self, index: usize) {
        if index < self.field_count {
            self.bits[index / 8] |= 1 << (index % 8);
        }
    }

    pub fn mark_all(&mut self) {
        for index in 0..self.field_count {
            self.mark(index);
        }
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.bits
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Returns the current mask and leaves every bit cleared.
    pub fn snapshot_and_clear(&mut self) -> DirtyMask {
        let snapshot = self.clone();
        self.clear();
        snapshot
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Indices of set bits, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bits.len() * 8).filter(|i| self.is_dirty(*i))
    }
}
