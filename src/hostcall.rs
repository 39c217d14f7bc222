//! The `CALL` host-call dispatch table (§6.5).
//!
//! `CALL` resolves a symbol by name in the `OS` section and invokes the
//! matching entry here. A host function's own failure (e.g. `os.error`)
//! is not a VM fault: it is reported by pushing `FALSE`. An unknown name
//! is a fatal dispatch error.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct HostCallError {
    pub name: String,
}

impl fmt::Display for HostCallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no host call registered for {:?}", self.name)
    }
}

impl std::error::Error for HostCallError {}

pub type HostFn = fn() -> bool;

/// A static registry mapping host-call names to implementations. The
/// default table contains test stubs plus a reserved slot for output.
pub struct HostTable {
    calls: HashMap<&'static str, HostFn>,
}

fn os_true() -> bool {
    true
}

fn os_false() -> bool {
    false
}

fn os_error() -> bool {
    false
}

fn os_print() -> bool {
    true
}

impl HostTable {
    pub fn default_table() -> HostTable {
        let mut calls: HashMap<&'static str, HostFn> = HashMap::new();
        calls.insert("os.true", os_true);
        calls.insert("os.false", os_false);
        calls.insert("os.error", os_error);
        calls.insert("os.print", os_print);
        HostTable { calls }
    }

    pub fn names(&self) -> impl Iterator<Item = &&'static str> {
        self.calls.keys()
    }

    /// Invoke `name`, returning its success/failure outcome. Returns an
    /// error only when `name` is not registered.
    pub fn call(&self, name: &str) -> Result<bool, HostCallError> {
        match self.calls.get(name) {
            Some(f) => Ok(f()),
            None => Err(HostCallError { name: name.to_string() }),
        }
    }
}

impl Default for HostTable {
    fn default() -> Self {
        HostTable::default_table()
    }
}
