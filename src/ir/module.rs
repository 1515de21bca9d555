//! IR modules: the unit of output.
//!
//! A module owns functions and globals, both keyed by symbol name. The
//! entity registry is the only mutator of the caller's target module during
//! a lift; the function lifter additionally keeps a private scratch module
//! that lifted bodies are built in before being cloned out.

use rustc_hash::FxHashMap;

use crate::{
    ir::{FnSig, Function, Linkage, Type},
    Error, Result,
};

/// Initializer of a module-level global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalInit {
    /// Declared external; no initializer.
    External,
    /// Defined with an all-zero initializer.
    Zero,
}

/// A module-level global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Symbol name.
    pub name: String,
    /// The global's value type.
    pub ty: Type,
    /// Symbol linkage.
    pub linkage: Linkage,
    /// The initializer.
    pub init: GlobalInit,
}

/// A collection of functions and globals keyed by symbol name.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Module identifier, used only by the writers.
    pub name: String,
    functions: Vec<Function>,
    globals: Vec<Global>,
    function_index: FxHashMap<String, usize>,
    global_index: FxHashMap<String, usize>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the functions in insertion order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the globals in insertion order.
    #[must_use]
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.function_index
            .get(name)
            .map(|&index| &self.functions[index])
    }

    /// Looks up a function by name, mutably.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        let index = *self.function_index.get(name)?;
        Some(&mut self.functions[index])
    }

    /// Adds a function. Fails if the name is already taken.
    ///
    /// # Errors
    /// Returns [`Error::Error`] on a name collision.
    pub fn add_function(&mut self, func: Function) -> Result<()> {
        if self.function_index.contains_key(&func.name) {
            return Err(Error::Error(format!(
                "function '{}' already exists in module '{}'",
                func.name, self.name
            )));
        }
        self.function_index
            .insert(func.name.clone(), self.functions.len());
        self.functions.push(func);
        Ok(())
    }

    /// Replaces the function with the same name, or adds it if absent.
    pub fn replace_function(&mut self, func: Function) {
        if let Some(&index) = self.function_index.get(&func.name) {
            self.functions[index] = func;
        } else {
            self.function_index
                .insert(func.name.clone(), self.functions.len());
            self.functions.push(func);
        }
    }

    /// Returns the named function, declaring it with `build` if absent.
    ///
    /// Used for intrinsics and sentinel functions: created on first use,
    /// reused thereafter.
    pub fn get_or_declare_function(
        &mut self,
        name: &str,
        build: impl FnOnce() -> Function,
    ) -> &Function {
        if let Some(&index) = self.function_index.get(name) {
            return &self.functions[index];
        }
        let func = build();
        debug_assert_eq!(func.name, name);
        self.function_index
            .insert(name.to_string(), self.functions.len());
        self.functions.push(func);
        self.functions.last().expect("just pushed")
    }

    /// Returns the signature of the named function, if present.
    #[must_use]
    pub fn function_sig(&self, name: &str) -> Option<&FnSig> {
        self.function(name).map(|func| &func.sig)
    }

    /// Looks up a global by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.global_index
            .get(name)
            .map(|&index| &self.globals[index])
    }

    /// Returns the named global, declaring it external with type `ty` if
    /// absent.
    pub fn get_or_declare_global(&mut self, name: &str, ty: Type) -> &Global {
        if let Some(&index) = self.global_index.get(name) {
            return &self.globals[index];
        }
        self.global_index
            .insert(name.to_string(), self.globals.len());
        self.globals.push(Global {
            name: name.to_string(),
            ty,
            linkage: Linkage::External,
            init: GlobalInit::External,
        });
        self.globals.last().expect("just pushed")
    }

    /// Adds a defined global. Fails if the name is already taken.
    ///
    /// # Errors
    /// Returns [`Error::Error`] on a name collision.
    pub fn add_global(&mut self, global: Global) -> Result<()> {
        if self.global_index.contains_key(&global.name) {
            return Err(Error::Error(format!(
                "global '{}' already exists in module '{}'",
                global.name, self.name
            )));
        }
        self.global_index
            .insert(global.name.clone(), self.globals.len());
        self.globals.push(global);
        Ok(())
    }

    /// Renames the symbol `old` to `new` across the module: the function
    /// or global itself, every call site, and every address-of-symbol
    /// constant.
    ///
    /// Does nothing if `new` is already taken or `old` does not exist.
    /// Returns `true` on success.
    pub fn rename_symbol(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return true;
        }
        if self.function_index.contains_key(new) || self.global_index.contains_key(new) {
            return false;
        }

        if let Some(index) = self.function_index.remove(old) {
            self.functions[index].name = new.to_string();
            self.function_index.insert(new.to_string(), index);
        } else if let Some(index) = self.global_index.remove(old) {
            self.globals[index].name = new.to_string();
            self.global_index.insert(new.to_string(), index);
        } else {
            return false;
        }

        for func in &mut self.functions {
            for inst in &mut func.insts {
                if let crate::ir::Op::Call { callee, .. } = &mut inst.op {
                    if callee == old {
                        *callee = new.to_string();
                    }
                }
            }
            for block in &mut func.blocks {
                if let crate::ir::Terminator::TailCall { callee, .. } = &mut block.term {
                    if callee == old {
                        *callee = new.to_string();
                    }
                }
            }
            for value in &mut func.values {
                if let crate::ir::ValueDef::Const(constant) = value {
                    match constant {
                        crate::ir::Const::GlobalAddr(name) if name == old => {
                            *name = new.to_string();
                        }
                        crate::ir::Const::SymbolOffset { symbol, .. } if symbol == old => {
                            *symbol = new.to_string();
                        }
                        _ => {}
                    }
                }
            }
        }
        true
    }

    /// Gives every still-declared global in the reserved output namespace a
    /// zero initializer and internal linkage.
    ///
    /// Run once after all entities are lifted, so the produced module is
    /// self-contained (the sentinels are observation points, not real
    /// external dependencies).
    pub fn internalize_reserved_globals(&mut self) {
        for global in &mut self.globals {
            if global.init == GlobalInit::External && crate::abi::is_reserved_name(&global.name) {
                global.init = GlobalInit::Zero;
                global.linkage = Linkage::Internal;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FnSig;

    fn void_func(name: &str) -> Function {
        Function::declare(name, FnSig::new(vec![], Type::Void), Linkage::External)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut module = Module::new("m");
        module.add_function(void_func("f")).unwrap();
        assert!(module.function("f").is_some());
        assert!(module.function("g").is_none());
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let mut module = Module::new("m");
        module.add_function(void_func("f")).unwrap();
        assert!(module.add_function(void_func("f")).is_err());
    }

    #[test]
    fn test_get_or_declare_function_reuses() {
        let mut module = Module::new("m");
        module.get_or_declare_function("f", || void_func("f"));
        module.get_or_declare_function("f", || panic!("must not be rebuilt"));
        assert_eq!(module.functions().len(), 1);
    }

    #[test]
    fn test_internalize_reserved_globals() {
        let mut module = Module::new("m");
        module.get_or_declare_global("__anvill_pc", Type::Int(8));
        module.get_or_declare_global("data_1000", Type::Int(32));
        module.internalize_reserved_globals();

        let pc = module.global("__anvill_pc").unwrap();
        assert_eq!(pc.init, GlobalInit::Zero);
        assert_eq!(pc.linkage, Linkage::Internal);

        let data = module.global("data_1000").unwrap();
        assert_eq!(data.init, GlobalInit::External);
    }
}
