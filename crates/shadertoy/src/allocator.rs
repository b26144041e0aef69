use renderer::{TextureUnit, CHANNEL_COUNT};

/// Hands out texture units in order, shared by every texture-backed input of
/// one shader so that no two inputs ever get the same unit.
#[derive(Debug)]
pub struct TextureUnitAllocator {
    next: u32,
    limit: u32,
}

impl TextureUnitAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            next: 0,
            limit: u32::try_from(limit).unwrap_or(u32::MAX),
        }
    }

    /// Returns `None` once `limit` units have been handed out.
    pub fn allocate(&mut self) -> Option<TextureUnit> {
        if self.next >= self.limit {
            return None;
        }
        let unit = TextureUnit::new(self.next);
        self.next += 1;
        Some(unit)
    }

    pub fn allocated(&self) -> usize {
        self.next as usize
    }

    pub fn limit(&self) -> usize {
        self.limit as usize
    }
}

impl Default for TextureUnitAllocator {
    fn default() -> Self {
        Self::new(CHANNEL_COUNT)
    }
}
