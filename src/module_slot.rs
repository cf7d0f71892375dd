//! §3 "Module slot": at most one of two states, *empty* or *loaded*.

use crate::sandbox::SandboxEngine;

/// Maximum length of a module identifier (§3: "≤31 printable bytes").
pub const MODULE_ID_CAPACITY: usize = 31;

pub type ModuleId = heapless::String<MODULE_ID_CAPACITY>;

/// Truncates `id` to [`MODULE_ID_CAPACITY`] bytes at a char boundary
/// (§4.4 step 10: "store truncated to 31 bytes").
pub fn truncated_module_id(id: &str) -> ModuleId {
    let mut cut = id.len().min(MODULE_ID_CAPACITY);
    while cut > 0 && !id.is_char_boundary(cut) {
        cut -= 1;
    }
    ModuleId::try_from(&id[..cut]).unwrap_or_default()
}

/// A successfully loaded module: the raw image, its parsed handle, and its
/// running instance, plus the id it was tagged with.
pub struct LoadedModule<E: SandboxEngine> {
    pub buffer: Vec<u8>,
    pub module: E::Module,
    pub instance: E::Instance,
    pub module_id: ModuleId,
}

/// The module slot itself: empty, or holding exactly one loaded module.
/// Teardown order when replacing or discarding a loaded module is strict
/// reverse of the acquisition order: instance, then module, then buffer,
/// which `Option::take` plus normal `Drop` ordering gives us for free. The
/// fields of `LoadedModule` are dropped in declaration order (instance,
/// module, buffer) when the struct itself is dropped.
pub struct ModuleSlot<E: SandboxEngine> {
    loaded: Option<LoadedModule<E>>,
}

impl<E: SandboxEngine> Default for ModuleSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SandboxEngine> ModuleSlot<E> {
    pub fn new() -> Self {
        Self { loaded: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.loaded.as_ref().map(|m| m.module_id.as_str())
    }

    pub fn get(&self) -> Option<&LoadedModule<E>> {
        self.loaded.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut LoadedModule<E>> {
        self.loaded.as_mut()
    }

    /// Tears down whatever is currently loaded (if anything) and leaves the
    /// slot empty. Safe to call on an already-empty slot.
    pub fn teardown(&mut self) {
        self.loaded = None;
    }

    /// Installs a newly loaded module, implicitly tearing down whatever was
    /// there before (§4.4 step 3: "If slot is loaded, tear it down
    /// unconditionally before any new allocation").
    pub fn install(&mut self, loaded: LoadedModule<E>) {
        self.loaded = Some(loaded);
    }
}
