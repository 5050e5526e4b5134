#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Named fields of the fixed world-state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    ContinueLevel,
    LoadedLevel,
    GameTurn,
    Version,
    CampaignFname,
    BonusesFound,
    Simulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub id: FieldId,
    pub range: ByteRange,
}

/// Byte map of a fixed-size record, so single fields can be read from a
/// file without decoding the rest of it.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub record_len: usize,
    pub fields: &'static [FieldLayout],
}

impl RecordLayout {
    pub fn field(&self, id: FieldId) -> Option<ByteRange> {
        self.fields.iter().find(|f| f.id == id).map(|f| f.range)
    }

    /// Index of the first field that does not start where the previous one
    /// ended. `Some(fields.len())` when the fields stop short of, or run
    /// past, `record_len`. `None` when they tile the record exactly.
    pub const fn misplaced_field(&self) -> Option<usize> {
        let mut next = 0;
        let mut i = 0;
        while i < self.fields.len() {
            let range = self.fields[i].range;
            if range.start != next || range.end < range.start {
                return Some(i);
            }
            next = range.end;
            i += 1;
        }
        if next == self.record_len && !self.fields.is_empty() {
            None
        } else {
            Some(self.fields.len())
        }
    }
}
