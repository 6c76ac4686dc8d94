//! Tag memory operations and their asynchronous results.
//!
//! An [`OperationSequence`] is handed to the reader once; the reader executes it
//! whenever it singulates a matching tag and reports each operation's outcome
//! later as an [`OpResult`], matched back by [`OpId`].

use crate::tag::Epc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_OP_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_SEQUENCE_ID: AtomicU32 = AtomicU32::new(1);

/// Gen2 memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryBank {
    /// Kill/access passwords, and vendor sensor registers on some chips.
    Reserved,
    /// EPC bank.
    Epc,
    /// Tag identifier bank.
    Tid,
    /// User memory.
    User,
}

/// Reader-unique operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl OpId {
    fn next() -> Self {
        OpId(NEXT_OP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One memory access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagOperation {
    /// Read `word_count` 16-bit words starting at `word_pointer`.
    Read {
        /// Operation id.
        id: OpId,
        /// Bank to read.
        bank: MemoryBank,
        /// First word.
        word_pointer: u16,
        /// Number of words.
        word_count: u16,
    },
    /// Write `data` starting at `word_pointer`.
    Write {
        /// Operation id.
        id: OpId,
        /// Bank to write.
        bank: MemoryBank,
        /// First word.
        word_pointer: u16,
        /// Words to write.
        data: Vec<u16>,
    },
}

impl TagOperation {
    /// New read operation with a fresh id.
    pub fn read(bank: MemoryBank, word_pointer: u16, word_count: u16) -> Self {
        TagOperation::Read {
            id: OpId::next(),
            bank,
            word_pointer,
            word_count,
        }
    }

    /// New write operation with a fresh id.
    pub fn write(bank: MemoryBank, word_pointer: u16, data: Vec<u16>) -> Self {
        TagOperation::Write {
            id: OpId::next(),
            bank,
            word_pointer,
            data,
        }
    }

    /// Operation id.
    pub fn id(&self) -> OpId {
        match self {
            TagOperation::Read { id, .. } | TagOperation::Write { id, .. } => *id,
        }
    }

    /// Read or write.
    pub fn kind(&self) -> OpKind {
        match self {
            TagOperation::Read { .. } => OpKind::Read,
            TagOperation::Write { .. } => OpKind::Write,
        }
    }
}

/// How often the reader runs a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Execution {
    /// Run on the first matching singulation, then discard.
    Once,
    /// Run every time a matching tag is singulated.
    EverySingulation,
}

/// Ordered operations bound for one tag (or any tag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSequence {
    /// Sequence id.
    pub id: u32,
    /// Only tags with this EPC execute the sequence; `None` means any tag.
    pub target: Option<Epc>,
    /// Operations in execution order.
    pub ops: Vec<TagOperation>,
    /// Execution policy.
    pub execution: Execution,
}

impl OperationSequence {
    /// Empty sequence that runs once on `target`.
    pub fn new(target: Option<Epc>) -> Self {
        Self {
            id: NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
            target,
            ops: Vec::new(),
            execution: Execution::Once,
        }
    }

    /// Append an operation.
    pub fn with_op(mut self, op: TagOperation) -> Self {
        self.ops.push(op);
        self
    }

    /// Set the execution policy.
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Whether the sequence applies to `epc`.
    pub fn applies_to(&self, epc: &Epc) -> bool {
        self.target.as_ref().map_or(true, |target| target == epc)
    }

    /// Ids of all operations, in order.
    pub fn op_ids(&self) -> Vec<OpId> {
        self.ops.iter().map(TagOperation::id).collect()
    }
}

/// Result kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Memory read.
    Read,
    /// Memory write.
    Write,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Read => write!(f, "Read"),
            OpKind::Write => write!(f, "Write"),
        }
    }
}

/// Data returned with a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpPayload {
    /// Bytes read (big-endian word order).
    Read(Vec<u8>),
    /// Number of words written.
    Written(u16),
}

/// Completion report for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    /// Operation this result belongs to.
    pub op_id: OpId,
    /// Tag that executed it.
    pub epc: Epc,
    /// Channel in use when it executed.
    pub channel_mhz: Option<f64>,
    /// Read or write.
    pub kind: OpKind,
    /// Whether the tag acknowledged the access.
    pub success: bool,
    /// Returned data.
    pub payload: OpPayload,
}

impl OpResult {
    /// Bytes of a successful read.
    pub fn read_data(&self) -> Option<&[u8]> {
        match (&self.payload, self.success) {
            (OpPayload::Read(bytes), true) => Some(bytes),
            _ => None,
        }
    }

    /// Payload as upper-case hex (reads) or word count (writes).
    pub fn payload_text(&self) -> String {
        match &self.payload {
            OpPayload::Read(bytes) => bytes.iter().map(|b| format!("{b:02X}")).collect(),
            OpPayload::Written(words) => words.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_ids_are_unique() {
        let a = TagOperation::read(MemoryBank::User, 0x10, 8);
        let b = TagOperation::read(MemoryBank::User, 0x10, 8);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn untargeted_sequence_applies_to_any_tag() {
        let epc = Epc::parse("AB12").unwrap();
        let any = OperationSequence::new(None);
        let other = OperationSequence::new(Some(Epc::parse("CD34").unwrap()));
        assert!(any.applies_to(&epc));
        assert!(!other.applies_to(&epc));
    }

    #[test]
    fn payload_text_formats() {
        let epc = Epc::parse("AB12").unwrap();
        let read = OpResult {
            op_id: OpId(7),
            epc: epc.clone(),
            channel_mhz: None,
            kind: OpKind::Read,
            success: true,
            payload: OpPayload::Read(vec![0xAA, 0x2F]),
        };
        assert_eq!(read.payload_text(), "AA2F");
        assert_eq!(read.read_data(), Some(&[0xAA, 0x2F][..]));

        let write = OpResult {
            payload: OpPayload::Written(1),
            kind: OpKind::Write,
            ..read
        };
        assert_eq!(write.payload_text(), "1");
        assert_eq!(write.read_data(), None);
    }
}
