//! `tvm`: the Toy VM's data model, image codec and execution core.
//!
//! This crate is the shared library linked by the `compiler` and
//! `vm-cli` binaries. It owns everything in §3 and §4 of the design
//! (AST, emitter, section/image codec, symbol table, VM); the frontend
//! grammar and both CLIs live in their own crates.

pub mod ast;
pub mod constants;
pub mod emitter;
pub mod hostcall;
pub mod opcode;
pub mod section;
pub mod symbol;
pub mod value;
pub mod vm;
