//! SSA intermediate representation for the minic C front-end.
//!
//! The front-end builds a [`Module`] — an ordered collection of named struct
//! types, global variables, and functions made of basic blocks — and hands it
//! to a backend. The only backend shipped here is the textual printer, which
//! renders the module as LLVM-flavored `.ll` text (opaque pointers), but the
//! module itself is plain data: a test backend can walk it directly.
//!
//! Construction goes through [`Function`]'s builder methods: create blocks,
//! move the insertion point, append instructions. Temporaries are numbered
//! per function; block labels are uniqued per function. [`verify`] checks the
//! one structural invariant every backend relies on: each block of a defined
//! function ends in a terminator.

pub mod instr;
pub mod module;
pub mod types;
pub mod value;
pub mod verify;

pub use instr::{BinOp, CastOp, FPred, IPred, Inst, InstKind};
pub use module::{Block, BlockId, Function, Global, Module, StructDef, SwitchLoc};
pub use types::Type;
pub use value::{Constant, Value};
pub use verify::{verify, VerifyError};
