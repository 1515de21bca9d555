//! The entity registry: addresses to IR entities in the output module.
//!
//! [`EntityLifter`] is the public face of lifting. It owns the target
//! module and the bidirectional address/entity maps, drives the function
//! lifter, and copies finished functions into the output. The registry is
//! the single mutator of the target module during a lift; the function
//! lifter only ever calls back into it through name lookups.

use log::error;
use rustc_hash::FxHashMap;

use crate::{
    arch::ArchRef,
    ir::{FnSig, Function, Global, GlobalInit, Linkage, Module, Type, ValueDef},
    lifter::{FunctionLifter, LifterOptions},
    provider::{ControlFlowProvider, MemoryProvider, TypeProvider},
    spec::{FunctionDecl, GlobalVarDecl},
};

/// Lifts entities (functions and variables) into an output module,
/// tracking address/entity associations across lifts.
pub struct EntityLifter<'p> {
    function_lifter: FunctionLifter<'p>,
    module: Module,
    address_to_entities: FxHashMap<u64, Vec<String>>,
    entity_to_address: FxHashMap<String, u64>,
}

impl<'p> EntityLifter<'p> {
    /// Creates an entity lifter producing into a fresh module.
    pub fn new(
        arch: ArchRef,
        options: LifterOptions,
        memory: &'p dyn MemoryProvider,
        types: &'p dyn TypeProvider,
        control_flow: &'p dyn ControlFlowProvider,
    ) -> Self {
        Self {
            function_lifter: FunctionLifter::new(arch, options, memory, types, control_flow),
            module: Module::new("lifted_code"),
            address_to_entities: FxHashMap::default(),
            entity_to_address: FxHashMap::default(),
        }
    }

    /// Returns the output module.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Returns the output module, mutably. Reserved for the driver's
    /// post-lift fixups (symbol naming, sentinel initialization).
    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// Consumes the lifter, yielding the output module.
    #[must_use]
    pub fn into_module(self) -> Module {
        self.module
    }

    /// Returns the entity names registered at `address`.
    #[must_use]
    pub fn entities_at(&self, address: u64) -> &[String] {
        self.address_to_entities
            .get(&address)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns the address associated with an entity name, if known.
    #[must_use]
    pub fn address_of(&self, name: &str) -> Option<u64> {
        self.entity_to_address.get(name).copied()
    }

    fn add_entity(&mut self, name: &str, address: u64) {
        let entities = self.address_to_entities.entry(address).or_default();
        if !entities.iter().any(|existing| existing == name) {
            entities.push(name.to_string());
        }
        self.entity_to_address.insert(name.to_string(), address);
    }

    /// Finds an already-registered function at `address` whose type
    /// matches `sig`, and separately notes any same-address function with
    /// a different type.
    fn find_existing(&self, address: u64, sig: &FnSig) -> (Option<String>, Option<String>) {
        let mut found_by_type = None;
        let mut found_by_address = None;
        for name in self.entities_at(address) {
            if let Some(func) = self.module.function(name) {
                if &func.sig == sig {
                    found_by_type.get_or_insert_with(|| name.clone());
                } else {
                    found_by_address.get_or_insert_with(|| name.clone());
                }
            }
        }
        (found_by_type, found_by_address)
    }

    /// Lifts the function described by `decl` into the output module.
    ///
    /// Returns the module-level name of the lifted function, or `None`
    /// when the entry is unusable (bad address, non-executable memory)
    /// and no previously lifted version exists.
    pub fn lift_entity(&mut self, decl: &FunctionDecl) -> Option<String> {
        let sig = decl.fn_sig();
        let (found_by_type, found_by_address) = self.find_existing(decl.address, &sig);

        if let Some(other) = &found_by_address {
            error!(
                "Ignoring existing version of function at address 0x{:x} named '{other}' \
                 with a different type",
                decl.address
            );
        }

        let Some(func) = self.function_lifter.lift_function(decl) else {
            return found_by_type;
        };

        Some(self.add_function_to_module(func, decl.address))
    }

    /// Declares the function described by `decl` in the output module
    /// without lifting a body.
    pub fn declare_entity(&mut self, decl: &FunctionDecl) -> Option<String> {
        let sig = decl.fn_sig();
        let (found_by_type, found_by_address) = self.find_existing(decl.address, &sig);
        if found_by_type.is_some() {
            return found_by_type;
        }
        if let Some(other) = &found_by_address {
            error!(
                "Ignoring existing version of function at address 0x{:x} named '{other}' \
                 with a different type",
                decl.address
            );
        }

        let name = self.function_lifter.declare_function(decl)?;
        if self.module.function(&name).is_none() {
            let mut shell = Function::declare(name.clone(), sig, Linkage::External);
            shell.inline = crate::ir::InlineHint::NoInline;
            shell.no_return = decl.is_noreturn;
            shell.calling_convention = decl.calling_convention;
            self.module.replace_function(shell);
        }
        self.add_entity(&name, decl.address);
        Some(name)
    }

    /// Lifts a global variable declaration into the output module.
    pub fn lift_variable(&mut self, decl: &GlobalVarDecl) -> String {
        let name = decl.name();
        if self.module.global(&name).is_none() {
            // Data contents are downstream concerns; the entity exists so
            // cross-references resolve.
            let _ = self.module.add_global(Global {
                name: name.clone(),
                ty: decl.ty.clone(),
                linkage: Linkage::External,
                init: GlobalInit::External,
            });
        }
        self.add_entity(&name, decl.address);
        name
    }

    /// Copies a freshly lifted function into the output module, replacing
    /// the body of any same-named declaration, then walks its calls and
    /// constants to register every known address/entity association.
    fn add_function_to_module(&mut self, func: Function, address: u64) -> String {
        let name = func.name.clone();

        if let Some(existing) = self.module.function(&name) {
            debug_assert_eq!(existing.sig, func.sig, "type-keyed name collided");
        }

        // Referenced symbols (intrinsics, sentinels, callee declarations)
        // must exist in the module for it to be self-contained.
        self.declare_referenced_symbols(&func);
        self.module.replace_function(func);
        self.add_entity(&name, address);

        // The function may call other lifted functions; keep the registry
        // aware of their addresses for future cross-reference resolution.
        let mut callees = Vec::new();
        if let Some(func) = self.module.function(&name) {
            func.for_each_callee(|callee| callees.push(callee.to_string()));
        }
        for callee in callees {
            if let Some(addr) = self.function_lifter.address_of_named_function(&callee) {
                self.add_entity(&callee, addr);
            }
        }
        name
    }

    fn declare_referenced_symbols(&mut self, func: &Function) {
        let mut called = Vec::new();
        func.for_each_callee(|callee| called.push(callee.to_string()));
        for callee in called {
            if self.module.function(&callee).is_none() {
                if let Some(template) = self.function_lifter.scratch_module().function(&callee) {
                    let mut decl = Function::declare(
                        template.name.clone(),
                        template.sig.clone(),
                        template.linkage,
                    );
                    decl.inline = template.inline;
                    decl.read_none = template.read_none;
                    decl.no_return = template.no_return;
                    decl.calling_convention = template.calling_convention;
                    self.module.replace_function(decl);
                }
            }
        }

        for value in &func.values {
            if let ValueDef::Const(constant) = value {
                let symbol = match constant {
                    crate::ir::Const::GlobalAddr(name) => Some(name.as_str()),
                    crate::ir::Const::SymbolOffset { symbol, .. } => Some(symbol.as_str()),
                    _ => None,
                };
                if let Some(symbol) = symbol {
                    if self.module.global(symbol).is_none() && self.module.function(symbol).is_none()
                    {
                        let ty = self
                            .function_lifter
                            .scratch_module()
                            .global(symbol)
                            .map_or(Type::Int(8), |global| global.ty.clone());
                        self.module.get_or_declare_global(symbol, ty);
                    }
                }
            }
        }
    }

    /// Applies a symbol name to the entity lifted at `address`, if any.
    pub fn name_entity(&mut self, address: u64, name: &str) {
        let Some(existing) = self.entities_at(address).first().cloned() else {
            return;
        };
        if self.module.rename_symbol(&existing, name) {
            let addr = self.entity_to_address.remove(&existing);
            if let Some(addr) = addr {
                self.entity_to_address.insert(name.to_string(), addr);
                if let Some(entities) = self.address_to_entities.get_mut(&addr) {
                    for entity in entities {
                        if entity == &existing {
                            *entity = name.to_string();
                        }
                    }
                }
            }
        }
    }
}
