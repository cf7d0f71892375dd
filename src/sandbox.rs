//! Sandbox execution engine collaborator (out of scope per §1: "the
//! sandboxed execution engine itself, treated as an opaque module-loader +
//! caller + canceller interface"). [`SandboxEngine`] is that interface;
//! [`WasmiEngine`] is the concrete, in-ecosystem implementation backing it.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::gpio::GpioPin;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("module parse failed: {0}")]
    Parse(String),
    #[error("instantiation failed: {0}")]
    Instantiate(String),
    #[error("export not found: {0}")]
    NoSuchExport(String),
    #[error("call failed: {0}")]
    Call(String),
}

/// Outcome of invoking a guest export.
pub enum CallOutcome {
    /// The call returned normally. `ret_i32` is `Some` iff the function's
    /// result arity is > 0, per §4.5 step 8 ("result arity > 0").
    Returned { ret_i32: Option<u32> },
    /// The call trapped (guest exception). Carries the engine's
    /// diagnostic string, or `None` if the engine didn't provide one.
    Trapped(Option<String>),
}

/// Dependencies handed to the guest's native imports at instantiation
/// time, rather than read from process-wide globals (§9 design note).
pub struct NativeContext {
    pub stop_requested: Arc<AtomicBool>,
    pub gpio: Box<dyn GpioPin>,
    pub gpio_toggle_sleep: Duration,
}

/// The opaque module-loader + caller + canceller interface. Generic over
/// engine-specific module/instance handles rather than boxed trait objects,
/// so each engine keeps its native ownership model (e.g. wasmi's
/// `Store<T>`) without an extra indirection layer.
pub trait SandboxEngine {
    type Module: Send;
    type Instance: Send;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Module, SandboxError>;

    fn instantiate(
        &self,
        module: &Self::Module,
        stack_bytes: u32,
        heap_bytes: u32,
        native: NativeContext,
    ) -> Result<Self::Instance, SandboxError>;

    fn has_export(&self, instance: &Self::Instance, name: &str) -> bool;

    fn call(
        &self,
        instance: &mut Self::Instance,
        name: &str,
        argv: &[u32],
    ) -> Result<CallOutcome, SandboxError>;
}

/// Host-function state linked into the guest's `env` imports.
struct HostState {
    stop_requested: Arc<AtomicBool>,
    gpio: Box<dyn GpioPin>,
    gpio_toggle_sleep: Duration,
}

pub struct WasmiModule {
    module: wasmi::Module,
}

pub struct WasmiInstance {
    store: wasmi::Store<HostState>,
    instance: wasmi::Instance,
}

/// `wasmi`-backed sandbox: a pure-Rust, no_std-capable WebAssembly
/// interpreter, the ecosystem's natural replacement for the original
/// WAMR-based module loader.
pub struct WasmiEngine {
    engine: wasmi::Engine,
}

impl WasmiEngine {
    pub fn new() -> Self {
        Self {
            engine: wasmi::Engine::default(),
        }
    }
}

impl Default for WasmiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxEngine for WasmiEngine {
    type Module = WasmiModule;
    type Instance = WasmiInstance;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Module, SandboxError> {
        wasmi::Module::new(&self.engine, bytes)
            .map(|module| WasmiModule { module })
            .map_err(|e| SandboxError::Parse(e.to_string()))
    }

    fn instantiate(
        &self,
        module: &Self::Module,
        stack_bytes: u32,
        heap_bytes: u32,
        native: NativeContext,
    ) -> Result<Self::Instance, SandboxError> {
        log::debug!(
            "instantiating guest module (stack budget {}B, heap budget {}B)",
            stack_bytes,
            heap_bytes
        );

        let host_state = HostState {
            stop_requested: native.stop_requested,
            gpio: native.gpio,
            gpio_toggle_sleep: native.gpio_toggle_sleep,
        };
        let mut store = wasmi::Store::new(&self.engine, host_state);
        let mut linker = wasmi::Linker::new(&self.engine);

        linker
            .func_wrap("env", "gpio_toggle", |mut caller: wasmi::Caller<'_, HostState>| {
                let data = caller.data_mut();
                if let Err(err) = data.gpio.toggle() {
                    log::warn!("gpio_toggle native failed: {err}");
                }
                std::thread::sleep(data.gpio_toggle_sleep);
            })
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;

        linker
            .func_wrap(
                "env",
                "should_stop",
                |caller: wasmi::Caller<'_, HostState>| -> i32 {
                    if caller
                        .data()
                        .stop_requested
                        .load(std::sync::atomic::Ordering::SeqCst)
                    {
                        1
                    } else {
                        0
                    }
                },
            )
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;

        let pre = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
        let instance = pre
            .start(&mut store)
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;

        Ok(WasmiInstance { store, instance })
    }

    fn has_export(&self, instance: &Self::Instance, name: &str) -> bool {
        instance.instance.get_func(&instance.store, name).is_some()
    }

    fn call(
        &self,
        instance: &mut Self::Instance,
        name: &str,
        argv: &[u32],
    ) -> Result<CallOutcome, SandboxError> {
        let func = instance
            .instance
            .get_func(&instance.store, name)
            .ok_or_else(|| SandboxError::NoSuchExport(name.to_string()))?;

        let ty = func.ty(&instance.store);
        let params: Vec<wasmi::Val> = argv.iter().map(|&v| wasmi::Val::I32(v as i32)).collect();
        let result_count = ty.results().len();
        let mut results = vec![wasmi::Val::I32(0); result_count];

        match func.call(&mut instance.store, &params, &mut results) {
            Ok(()) => {
                let ret_i32 = results.first().map(|v| match v {
                    wasmi::Val::I32(i) => *i as u32,
                    wasmi::Val::I64(i) => *i as u32,
                    wasmi::Val::F32(f) => f.to_bits(),
                    wasmi::Val::F64(f) => f.to_bits() as u32,
                    _ => 0,
                });
                Ok(CallOutcome::Returned {
                    ret_i32: if result_count > 0 { ret_i32 } else { None },
                })
            }
            Err(err) => Ok(CallOutcome::Trapped(Some(err.to_string()))),
        }
    }
}

/// Deterministic in-process fake engine used by unit and integration tests:
/// guest "modules" are tiny scripted programs rather than real `.wasm`
/// binaries, so scenarios don't need a compiled guest artifact on disk.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;

    /// A scripted guest export: either an arithmetic sum of its first two
    /// args (covers scenario 3, `add(a,b)`), a toggle-and-poll loop that
    /// calls the GPIO native a fixed number of times while polling
    /// `should_stop` (covers scenarios 1/4/5), or a module that always
    /// traps (covers the EXCEPTION path).
    #[derive(Clone)]
    pub enum ScriptedExport {
        Sum,
        ToggleLoop { iterations: u32 },
        AlwaysTraps,
        VoidNoop,
    }

    #[derive(Clone, Default)]
    pub struct FakeModule {
        pub exports: HashMap<String, ScriptedExport>,
    }

    impl FakeModule {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_export(mut self, name: &str, export: ScriptedExport) -> Self {
            self.exports.insert(name.to_string(), export);
            self
        }
    }

    pub struct FakeInstance {
        module: FakeModule,
        stop_requested: Arc<AtomicBool>,
        gpio: Box<dyn GpioPin>,
        gpio_toggle_sleep: Duration,
    }

    #[derive(Default)]
    pub struct FakeEngine {
        /// When set, `parse` fails with this message instead of succeeding,
        /// used to exercise the LOAD_FAIL path.
        pub fail_parse: Option<String>,
        /// When set, `instantiate` fails with this message, exercising the
        /// INSTANTIATE_FAIL path.
        pub fail_instantiate: Option<String>,
    }

    impl SandboxEngine for FakeEngine {
        type Module = FakeModule;
        type Instance = FakeInstance;

        fn parse(&self, bytes: &[u8]) -> Result<Self::Module, SandboxError> {
            if let Some(msg) = &self.fail_parse {
                return Err(SandboxError::Parse(msg.clone()));
            }
            // The fake "binary format" is just a tag byte scripting the
            // single export named "run"/"add"/"toggle_n" as appropriate;
            // tests build `FakeModule` directly and serialize it to bytes
            // via `encode`/`decode` below so CRC/size math stays faithful
            // to real byte payloads.
            decode(bytes).ok_or_else(|| SandboxError::Parse("bad fake module".into()))
        }

        fn instantiate(
            &self,
            module: &Self::Module,
            _stack_bytes: u32,
            _heap_bytes: u32,
            native: NativeContext,
        ) -> Result<Self::Instance, SandboxError> {
            if let Some(msg) = &self.fail_instantiate {
                return Err(SandboxError::Instantiate(msg.clone()));
            }
            Ok(FakeInstance {
                module: module.clone(),
                stop_requested: native.stop_requested,
                gpio: native.gpio,
                gpio_toggle_sleep: native.gpio_toggle_sleep,
            })
        }

        fn has_export(&self, instance: &Self::Instance, name: &str) -> bool {
            instance.module.exports.contains_key(name)
        }

        fn call(
            &self,
            instance: &mut Self::Instance,
            name: &str,
            argv: &[u32],
        ) -> Result<CallOutcome, SandboxError> {
            let export = instance
                .module
                .exports
                .get(name)
                .cloned()
                .ok_or_else(|| SandboxError::NoSuchExport(name.to_string()))?;

            match export {
                ScriptedExport::Sum => {
                    let sum = argv.iter().take(2).sum::<u32>();
                    Ok(CallOutcome::Returned {
                        ret_i32: Some(sum),
                    })
                }
                ScriptedExport::VoidNoop => Ok(CallOutcome::Returned { ret_i32: None }),
                ScriptedExport::AlwaysTraps => {
                    Ok(CallOutcome::Trapped(Some("simulated guest trap".into())))
                }
                ScriptedExport::ToggleLoop { iterations } => {
                    for _ in 0..iterations {
                        if instance
                            .stop_requested
                            .load(std::sync::atomic::Ordering::SeqCst)
                        {
                            break;
                        }
                        let _ = instance.gpio.toggle();
                        std::thread::sleep(instance.gpio_toggle_sleep);
                    }
                    Ok(CallOutcome::Returned { ret_i32: None })
                }
            }
        }
    }

    /// Encodes a [`FakeModule`] into a deterministic byte payload so tests
    /// can exercise the real CRC32/size-based LOAD path against it.
    pub fn encode(module: &FakeModule) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"FAKEWASM");
        for (name, export) in &module.exports {
            let tag: u8 = match export {
                ScriptedExport::Sum => 1,
                ScriptedExport::ToggleLoop { .. } => 2,
                ScriptedExport::AlwaysTraps => 3,
                ScriptedExport::VoidNoop => 4,
            };
            out.push(tag);
            if let ScriptedExport::ToggleLoop { iterations } = export {
                out.extend_from_slice(&iterations.to_le_bytes());
            } else {
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Option<FakeModule> {
        if !bytes.starts_with(b"FAKEWASM") {
            return None;
        }
        let mut pos = 8;
        let mut module = FakeModule::new();
        while pos < bytes.len() {
            let tag = *bytes.get(pos)?;
            pos += 1;
            let iter_bytes = bytes.get(pos..pos + 4)?;
            let iterations = u32::from_le_bytes(iter_bytes.try_into().ok()?);
            pos += 4;
            let name_len = *bytes.get(pos)? as usize;
            pos += 1;
            let name = std::str::from_utf8(bytes.get(pos..pos + name_len)?).ok()?;
            pos += name_len;
            let export = match tag {
                1 => ScriptedExport::Sum,
                2 => ScriptedExport::ToggleLoop { iterations },
                3 => ScriptedExport::AlwaysTraps,
                4 => ScriptedExport::VoidNoop,
                _ => return None,
            };
            module = module.with_export(name, export);
        }
        Some(module)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trips_through_encode_decode() {
            let m = FakeModule::new()
                .with_export("run", ScriptedExport::VoidNoop)
                .with_export("add", ScriptedExport::Sum);
            let bytes = encode(&m);
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded.exports.len(), 2);
        }
    }
}
