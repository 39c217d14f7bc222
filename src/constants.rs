//! Reserved identifiers and tunables shared across the emitter, the section
//! codec and the VM.

/// Reserved command-stack value meaning boolean false. Never backed by a
/// symbol-table entry.
pub const FALSE: u64 = 0;
/// Reserved command-stack value meaning boolean true.
pub const TRUE: u64 = 1;
/// Sentinel operand for `POP` meaning "discard the popped value".
pub const DISCARD: u64 = 2;
/// Symbol IDs below this value are reserved and never allocated to a
/// table entry.
pub const SYM_RESERVED: u64 = 256;

/// First ID handed out by the emitter's symbol allocator.
pub const EMITTER_ID_BASE: u64 = 1000;

/// Initial capacity of the VM's command and call stacks, in words.
pub const STACK_INITIAL_CAPACITY: usize = 1024;

/// Automatic-GC trigger: once this many ref-count decrements to zero have
/// accumulated since the last sweep, the VM runs a collection pass at the
/// next safe point.
pub const GC_THRESHOLD: u64 = 5000;

/// Sentinel written into a branch/jump argument slot before its label is
/// bound; any value still equal to this at image finalization means a
/// forward branch was never resolved.
pub const FIXUP_SENTINEL: u64 = u64::max_value();
