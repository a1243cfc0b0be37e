use serde::{Deserialize, Serialize};

/// Denominations of the cash box slots in minimum currency units.
/// Coins first, bills from [`BILL_INDEX`] on.
pub const SLOT_VALUES: [u32; 15] = [
    1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 2000, 5000, 10000, 20000, 50000,
];

/// Index of the first bill slot in [`SLOT_VALUES`]
pub const BILL_INDEX: usize = 8;

/// Which part of the cash box a state or event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashScope {
    /// Coin slots
    Coins,
    /// Bill slots
    Bills,
    /// Coins and bills combined
    All,
}

impl CashScope {
    /// Slot index range covered by this scope
    pub fn slot_range(self) -> std::ops::Range<usize> {
        match self {
            CashScope::Coins => 0..BILL_INDEX,
            CashScope::Bills => BILL_INDEX..SLOT_VALUES.len(),
            CashScope::All => 0..SLOT_VALUES.len(),
        }
    }
}

/// Empty sensor level, ordered worst first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum EmptyLevel {
    /// At least one slot empty
    Empty,
    /// At least one slot nearly empty
    NearEmpty,
    /// All slots fine
    #[default]
    Ok,
}

/// Full sensor level, ordered worst first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum FullLevel {
    /// At least one slot full
    Full,
    /// At least one slot nearly full
    NearFull,
    /// All slots fine
    #[default]
    Ok,
}

/// Operational state of the cash box
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CashOperation {
    /// Idle
    Idle,
    /// Cash input running
    Input,
    /// Cash input stopped, deposit not yet finished
    FinishInput,
    /// Slot jammed
    Jam,
    /// Cash box opened
    #[default]
    Opened,
}

impl CashOperation {
    /// Jam and opened both block cash handling
    pub fn is_jammed(self) -> bool {
        self > CashOperation::FinishInput
    }
}

/// Sensor state of one cash scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CashState {
    /// Empty sensor
    pub empty: EmptyLevel,
    /// Full sensor
    pub full: FullLevel,
    /// Operation state
    pub operation: CashOperation,
}

impl CashState {
    /// Worse of two states per sensor, operation taken from `self`
    pub fn combine(&self, other: &CashState) -> CashState {
        CashState {
            empty: self.empty.min(other.empty),
            full: self.full.min(other.full),
            operation: self.operation,
        }
    }
}

/// One cash box slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CashSlot {
    /// Denomination in minimum currency units
    pub value: u32,
    /// Number of pieces
    pub count: i64,
}

/// Slot table of the cash box, ordered by denomination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotTable {
    slots: Vec<CashSlot>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self {
            slots: SLOT_VALUES
                .iter()
                .map(|&value| CashSlot { value, count: 0 })
                .collect(),
        }
    }
}

impl SlotTable {
    /// Build a table from raw slots
    pub fn from_slots(slots: Vec<CashSlot>) -> Self {
        Self { slots }
    }

    /// All slots
    pub fn slots(&self) -> &[CashSlot] {
        &self.slots
    }

    /// Slots in a scope
    pub fn scope(&self, scope: CashScope) -> &[CashSlot] {
        let range = scope.slot_range();
        let end = range.end.min(self.slots.len());
        let start = range.start.min(end);
        &self.slots[start..end]
    }

    /// Count of the slot holding `value`
    pub fn count_of(&self, value: u32) -> Option<i64> {
        self.slots.iter().find(|s| s.value == value).map(|s| s.count)
    }

    /// Whether the denominations are exactly [`SLOT_VALUES`]
    pub fn has_standard_layout(&self) -> bool {
        self.slots.len() == SLOT_VALUES.len()
            && self.slots.iter().zip(SLOT_VALUES).all(|(s, v)| s.value == v)
    }

    /// Per-slot count difference `self - start`
    pub fn delta(&self, start: &SlotTable) -> SlotTable {
        let slots = self
            .slots
            .iter()
            .zip(&start.slots)
            .map(|(now, then)| CashSlot {
                value: now.value,
                count: now.count - then.count,
            })
            .collect();
        SlotTable { slots }
    }

    /// Total value of a scope
    pub fn amount(&self, scope: CashScope) -> i64 {
        self.scope(scope)
            .iter()
            .map(|s| i64::from(s.value) * s.count)
            .sum()
    }

    /// Counts in `value:count` notation, bills after a `;`
    pub fn counts(&self, scope: CashScope) -> String {
        let join = |slots: &[CashSlot]| {
            slots
                .iter()
                .map(|s| format!("{}:{}", s.value, s.count))
                .collect::<Vec<_>>()
                .join(",")
        };
        match scope {
            CashScope::Coins => join(self.scope(CashScope::Coins)),
            CashScope::Bills => format!(";{}", join(self.scope(CashScope::Bills))),
            CashScope::All => format!(
                "{};{}",
                join(self.scope(CashScope::Coins)),
                join(self.scope(CashScope::Bills))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_layout() {
        let table = SlotTable::default();
        assert!(table.has_standard_layout());
        assert_eq!(table.scope(CashScope::Coins).len(), 8);
        assert_eq!(table.scope(CashScope::Bills).len(), 7);
        assert_eq!(table.amount(CashScope::All), 0);
    }

    #[test]
    fn test_delta_and_amount() {
        let start = SlotTable::default();
        let mut slots = start.slots().to_vec();
        slots[0].count = 3; // 3 x 1
        slots[BILL_INDEX].count = 2; // 2 x 500
        let now = SlotTable::from_slots(slots);

        let delta = now.delta(&start);
        assert_eq!(delta.amount(CashScope::Coins), 3);
        assert_eq!(delta.amount(CashScope::Bills), 1000);
        assert_eq!(delta.amount(CashScope::All), 1003);
    }

    #[test]
    fn test_counts_notation() {
        let table = SlotTable::default();
        assert!(table.counts(CashScope::Coins).starts_with("1:0,2:0"));
        assert!(table.counts(CashScope::Bills).starts_with(";500:0"));
        assert!(table.counts(CashScope::All).contains(";500:0"));
    }

    #[test]
    fn test_combine_takes_worse_level() {
        let coins = CashState {
            empty: EmptyLevel::NearEmpty,
            full: FullLevel::Ok,
            operation: CashOperation::Idle,
        };
        let bills = CashState {
            empty: EmptyLevel::Ok,
            full: FullLevel::Full,
            operation: CashOperation::Idle,
        };
        let both = bills.combine(&coins);
        assert_eq!(both.empty, EmptyLevel::NearEmpty);
        assert_eq!(both.full, FullLevel::Full);
    }

    #[test]
    fn test_jam_detection() {
        assert!(!CashOperation::FinishInput.is_jammed());
        assert!(CashOperation::Jam.is_jammed());
        assert!(CashOperation::Opened.is_jammed());
    }
}
