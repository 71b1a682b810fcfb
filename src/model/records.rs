//! Elementary mutation log for inspecting and replaying a `mutate` call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationOp {
    /// A scalar value was changed by the mutation policy.
    ScalarMutate,
    /// The policy result exceeded the budget; a size-neutral flip was used instead.
    ScalarNeutral,
    /// The change was dropped because nothing fit the budget.
    Skipped {
        reason: String,
    },
    FieldSet,
    FieldClear,
    MessageCreate,
    RepeatedAppend,
    RepeatedRemove {
        index: usize,
    },
    RepeatedDuplicate {
        from: usize,
        to: usize,
    },
    RepeatedSwap {
        a: usize,
        b: usize,
    },
    OneofSwitch {
        from: Option<String>,
        to: String,
    },
    OneofClear {
        from: String,
    },
}

impl MutationOp {
    /// True when the operation can grow the instance.
    pub fn is_growth(&self) -> bool {
        matches!(
            self,
            Self::FieldSet
                | Self::MessageCreate
                | Self::RepeatedAppend
                | Self::RepeatedDuplicate { .. }
                | Self::OneofSwitch { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationRecord {
    /// Field path from the root, e.g. `items[2].name`.
    pub path: String,
    pub op: MutationOp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationLog {
    pub records: Vec<MutationRecord>,
}

impl MutationLog {
    pub fn push(&mut self, path: impl Into<String>, op: MutationOp) {
        let record = MutationRecord {
            path: path.into(),
            op,
        };
        tracing::trace!(path = %record.path, op = ?record.op, "elementary mutation");
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_serialize_with_kind_tag() {
        let mut log = MutationLog::default();
        log.push("items[1]", MutationOp::RepeatedSwap { a: 0, b: 1 });
        log.push("name", MutationOp::ScalarMutate);
        let json = serde_json::to_value(&log).expect("json");
        assert_eq!(json["records"][0]["op"]["kind"], "repeated_swap");
        assert_eq!(json["records"][1]["path"], "name");
        let back: MutationLog = serde_json::from_value(json).expect("parse");
        assert_eq!(back, log);
    }
}
