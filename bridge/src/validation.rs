//! Guest module validation: ABI compatibility checks.
//!
//! Checks a compiled module before it is instantiated:
//!
//! 1. `memory` is exported
//! 2. The allocator and entry point exports exist with i32-only signatures
//! 3. Every import comes from `env` and names a host function we provide
//! 4. No WASI imports
//!
//! A module that fails any check is rejected; there is no degraded mode.

use wasmtime::{ExternType, FuncType, Module, ValType};

use crate::config::ExportNames;
use crate::error::BridgeError;
use crate::linker::{HOST_IMPORTS, IMPORT_MODULE};

/// Shape of the guest's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryArity {
    /// `(event, distinct_id, api_key, properties)` as 4 pointer/length pairs.
    WithoutHost,
    /// The same four pairs followed by the target host.
    WithHost,
}

impl EntryArity {
    pub fn param_count(self) -> usize {
        match self {
            Self::WithoutHost => 8,
            Self::WithHost => 10,
        }
    }

    fn from_param_count(count: usize) -> Option<Self> {
        match count {
            8 => Some(Self::WithoutHost),
            10 => Some(Self::WithHost),
            _ => None,
        }
    }
}

fn is_i32(vt: &ValType) -> bool {
    matches!(vt, ValType::I32)
}

/// Validate a guest module and report its entry point shape.
pub fn validate_module(module: &Module, names: &ExportNames) -> Result<EntryArity, BridgeError> {
    validate_imports(module)?;
    validate_exports(module, names)
}

fn export_func(module: &Module, name: &str) -> Result<FuncType, BridgeError> {
    let export = module
        .exports()
        .find(|e| e.name() == name)
        .ok_or_else(|| BridgeError::Link(format!("missing required export: {}", name)))?;
    match export.ty() {
        ExternType::Func(ft) => Ok(ft),
        _ => Err(BridgeError::Link(format!(
            "export '{}' must be a function",
            name
        ))),
    }
}

fn check_signature(
    name: &str,
    func_ty: &FuncType,
    param_counts: &[usize],
    result_count: usize,
) -> Result<usize, BridgeError> {
    let params: Vec<ValType> = func_ty.params().collect();
    let results: Vec<ValType> = func_ty.results().collect();

    if !param_counts.contains(&params.len()) || !params.iter().all(is_i32) {
        return Err(BridgeError::Link(format!(
            "export '{}' has wrong param signature: expected {:?} i32 params, got {} params",
            name,
            param_counts,
            params.len()
        )));
    }
    if results.len() != result_count || !results.iter().all(is_i32) {
        return Err(BridgeError::Link(format!(
            "export '{}' has wrong result signature: expected {} i32 results, got {} results",
            name,
            result_count,
            results.len()
        )));
    }
    Ok(params.len())
}

fn validate_exports(module: &Module, names: &ExportNames) -> Result<EntryArity, BridgeError> {
    let has_memory = module
        .exports()
        .any(|e| e.name() == "memory" && matches!(e.ty(), ExternType::Memory(_)));
    if !has_memory {
        return Err(BridgeError::Link("module must export 'memory'".into()));
    }

    check_signature(&names.allocate, &export_func(module, &names.allocate)?, &[1], 1)?;
    check_signature(&names.deallocate, &export_func(module, &names.deallocate)?, &[2], 0)?;

    let entry = export_func(module, &names.entry_point)?;
    let count = check_signature(&names.entry_point, &entry, &[8, 10], 1)?;
    EntryArity::from_param_count(count)
        .ok_or_else(|| BridgeError::Link(format!("entry point takes {} params", count)))
}

fn validate_imports(module: &Module) -> Result<(), BridgeError> {
    for import in module.imports() {
        let module_name = import.module();

        if module_name.starts_with("wasi") {
            return Err(BridgeError::Link(format!(
                "WASI import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }

        if module_name != IMPORT_MODULE {
            return Err(BridgeError::Link(format!(
                "import from unknown module '{}' (only '{}' allowed): {}",
                module_name,
                IMPORT_MODULE,
                import.name()
            )));
        }

        if !HOST_IMPORTS.contains(&import.name()) {
            return Err(BridgeError::Link(format!(
                "guest imports '{}::{}', which the host does not provide",
                module_name,
                import.name()
            )));
        }

        if !matches!(import.ty(), ExternType::Func(_)) {
            return Err(BridgeError::Link(format!(
                "non-function import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }
    }

    Ok(())
}
