//! Structural verification.
//!
//! One invariant matters to every backend: each basic block of a defined
//! function ends in exactly one terminator, and terminators appear nowhere
//! else. The front-end's statement lowering maintains this by construction;
//! the verifier is the safety net the emitter runs before handing the module
//! out.

use crate::module::{Function, Module};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyError {
    pub function: String,
    pub block: String,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification failed in @{}, block %{}: {}",
            self.function, self.block, self.message
        )
    }
}

impl std::error::Error for VerifyError {}

pub fn verify(module: &Module) -> Result<(), VerifyError> {
    for func in &module.functions {
        verify_function(func)?;
    }
    Ok(())
}

fn verify_function(func: &Function) -> Result<(), VerifyError> {
    if func.is_declaration() {
        return Ok(());
    }
    for block in &func.blocks {
        let err = |message: String| VerifyError {
            function: func.name.clone(),
            block: block.label.clone(),
            message,
        };
        match block.insts.last() {
            None => return Err(err("empty block".to_string())),
            Some(last) if !last.kind.is_terminator() => {
                return Err(err(format!("does not end in a terminator: {}", last)));
            }
            _ => {}
        }
        for inst in &block.insts[..block.insts.len() - 1] {
            if inst.kind.is_terminator() {
                return Err(err(format!("terminator in mid-block: {}", inst)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use crate::value::Value;

    #[test]
    fn test_verify_accepts_terminated_blocks() {
        let mut module = Module::new("t.c", "", "");
        let mut func = Function::new("f", Type::I32, vec![], false);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        func.ret(Type::I32, Some(Value::ConstInt(0)));
        module.functions.push(func);
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn test_verify_rejects_open_block() {
        let mut module = Module::new("t.c", "", "");
        let mut func = Function::new("f", Type::I32, vec![], false);
        let entry = func.add_block("entry");
        func.set_insert_point(entry);
        func.load(Type::I32, Value::Local("x".into()));
        module.functions.push(func);
        let err = verify(&module).unwrap_err();
        assert_eq!(err.function, "f");
        assert_eq!(err.block, "entry");
    }

    #[test]
    fn test_verify_rejects_empty_block() {
        let mut module = Module::new("t.c", "", "");
        let mut func = Function::new("f", Type::Void, vec![], false);
        func.add_block("entry");
        module.functions.push(func);
        assert!(verify(&module).is_err());
    }

    #[test]
    fn test_verify_skips_declarations() {
        let mut module = Module::new("t.c", "", "");
        module
            .functions
            .push(Function::new("ext", Type::Void, vec![], false));
        assert!(verify(&module).is_ok());
    }
}
