//! Scm Core: the contract shared by the compiler and the interpreter
//!
//! This crate holds the two pieces of the system that both sides must agree
//! on byte-for-byte:
//!
//! - `value`: the 64-bit tagged word encoding for immediate values (fixnums,
//!   booleans, characters, the empty list) and the tag constants for the
//!   heap-allocated kinds the interpreter builds at runtime.
//! - `opcode`: the dense opcode numbering consumed by the interpreter, plus
//!   a disassembler for diagnostic listings.
//!
//! The compiler embeds boxed immediates directly into the bytecode stream as
//! `LOAD64` operands, so any drift here is a wire-format break, not just a
//! refactor.

pub mod opcode;
pub mod value;

pub use opcode::{Op, disassemble};
pub use value::{FixnumOverflow, box_bool, box_char, box_empty_list, box_fixnum};
