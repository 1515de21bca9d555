//! The in-memory representation of a parsed specification.
//!
//! A [`Program`] owns every long-lived input of a lift: function and
//! variable declarations, mapped memory ranges, symbol names, and the
//! control-flow redirection table. It implements all three provider traits
//! so it can back a lift directly.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{
    arch::ArchRef,
    provider::{
        ByteAvailability, ByteQuery, BytePermission, ControlFlowProvider, MemoryProvider,
        RegisterHintVisitor, TypeProvider,
    },
    spec::{ByteRange, FunctionDecl, GlobalVarDecl},
    Error, Result,
};

#[derive(Debug, Clone)]
struct MappedRange {
    data: Vec<u8>,
    permission: BytePermission,
}

/// The parsed specification: declarations, memory, symbols, redirections.
pub struct Program {
    arch: ArchRef,
    functions: BTreeMap<u64, FunctionDecl>,
    variables: BTreeMap<u64, GlobalVarDecl>,
    ranges: BTreeMap<u64, MappedRange>,
    symbols: Vec<(u64, String)>,
    redirections: FxHashMap<u64, u64>,
}

impl Program {
    /// Creates an empty program for `arch`.
    #[must_use]
    pub fn new(arch: ArchRef) -> Self {
        Self {
            arch,
            functions: BTreeMap::new(),
            variables: BTreeMap::new(),
            ranges: BTreeMap::new(),
            symbols: Vec::new(),
            redirections: FxHashMap::default(),
        }
    }

    /// Returns the target architecture.
    #[must_use]
    pub fn arch(&self) -> &ArchRef {
        &self.arch
    }

    /// Registers a function declaration.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateDeclaration`] if a function or variable is
    /// already declared at the address.
    pub fn declare_function(&mut self, decl: FunctionDecl) -> Result<()> {
        let address = decl.address;
        if self.functions.contains_key(&address) || self.variables.contains_key(&address) {
            return Err(Error::DuplicateDeclaration(address));
        }
        self.functions.insert(address, decl);
        Ok(())
    }

    /// Registers a global variable declaration.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateDeclaration`] if a function or variable is
    /// already declared at the address.
    pub fn declare_variable(&mut self, decl: GlobalVarDecl) -> Result<()> {
        let address = decl.address;
        if self.functions.contains_key(&address) || self.variables.contains_key(&address) {
            return Err(Error::DuplicateDeclaration(address));
        }
        self.variables.insert(address, decl);
        Ok(())
    }

    /// Maps a memory range.
    ///
    /// # Errors
    /// Returns [`Error::OverlappingRange`] if the range intersects one that
    /// is already mapped.
    pub fn map_range(&mut self, range: ByteRange) -> Result<()> {
        let start = range.address;
        let end = start + range.data.len() as u64;

        if let Some((&prev_start, prev)) = self.ranges.range(..=start).next_back() {
            if prev_start + prev.data.len() as u64 > start {
                return Err(Error::OverlappingRange(start));
            }
        }
        if let Some((&next_start, _)) = self.ranges.range(start..).next() {
            if next_start < end {
                return Err(Error::OverlappingRange(start));
            }
        }

        let permission = match (range.is_writeable, range.is_executable) {
            (false, false) => BytePermission::Readable,
            (true, false) => BytePermission::ReadableWritable,
            (false, true) => BytePermission::ReadableExecutable,
            (true, true) => BytePermission::ReadableWritableExecutable,
        };
        self.ranges.insert(
            start,
            MappedRange {
                data: range.data,
                permission,
            },
        );
        Ok(())
    }

    /// Associates `name` with `address`.
    pub fn add_symbol(&mut self, name: impl Into<String>, address: u64) {
        self.symbols.push((address, name.into()));
    }

    /// Adds a control-flow redirection `from -> to`.
    ///
    /// The table is kept transitively resolved so that redirection stays
    /// idempotent: inserting `a -> b` after `b -> c` records `a -> c`, and
    /// existing entries targeting `a` are rewritten.
    pub fn add_control_flow_redirection(&mut self, from: u64, to: u64) {
        let resolved = self.redirections.get(&to).copied().unwrap_or(to);
        self.redirections.insert(from, resolved);
        for target in self.redirections.values_mut() {
            if *target == from {
                *target = resolved;
            }
        }
    }

    /// Returns the function declared at `address`, if any.
    #[must_use]
    pub fn function_at(&self, address: u64) -> Option<&FunctionDecl> {
        self.functions.get(&address)
    }

    /// Returns the variable declared at `address`, if any.
    #[must_use]
    pub fn variable_at(&self, address: u64) -> Option<&GlobalVarDecl> {
        self.variables.get(&address)
    }

    /// Invokes `f` for every function declaration, in address order.
    pub fn for_each_function(&self, mut f: impl FnMut(&FunctionDecl)) {
        for decl in self.functions.values() {
            f(decl);
        }
    }

    /// Invokes `f` for every variable declaration, in address order.
    pub fn for_each_variable(&self, mut f: impl FnMut(&GlobalVarDecl)) {
        for decl in self.variables.values() {
            f(decl);
        }
    }

    /// Invokes `f` for every `(address, name)` symbol pair, in insertion
    /// order.
    pub fn for_each_symbol(&self, mut f: impl FnMut(u64, &str)) {
        for (address, name) in &self.symbols {
            f(*address, name);
        }
    }
}

impl MemoryProvider for Program {
    fn query(&self, addr: u64) -> ByteQuery {
        if let Some((&start, range)) = self.ranges.range(..=addr).next_back() {
            let offset = (addr - start) as usize;
            if offset < range.data.len() {
                return (range.data[offset], ByteAvailability::Available, range.permission);
            }
        }
        (0, ByteAvailability::Unknown, BytePermission::Unknown)
    }
}

impl TypeProvider for Program {
    fn function_type(&self, addr: u64) -> Option<FunctionDecl> {
        self.functions.get(&addr).cloned()
    }

    fn register_hints_at(
        &self,
        func_addr: u64,
        inst_addr: u64,
        visitor: &mut RegisterHintVisitor<'_>,
    ) {
        if let Some(decl) = self.functions.get(&func_addr) {
            if let Some(hints) = decl.register_hints.get(&inst_addr) {
                for hint in hints {
                    visitor(&hint.register, &hint.ty, hint.value);
                }
            }
        }
    }
}

impl ControlFlowProvider for Program {
    fn redirection(&self, addr: u64) -> u64 {
        self.redirections.get(&addr).copied().unwrap_or(addr)
    }
}
