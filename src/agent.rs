//! §9 design note: "re-architect process-wide variables as a single owned
//! `Agent` value." [`Agent`] is that value: it holds every field the
//! discipline table in §5 enumerates, behind the primitive the table
//! prescribes for it, and owns the three execution contexts (reader,
//! COMM, RUNNER) as real OS threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::AgentConfig;
use crate::framer::RxFramer;
use crate::gpio::{GpioPin, SharedGpio};
use crate::module_slot::{ModuleId, ModuleSlot};
use crate::protocol;
use crate::queue::LineQueue;
use crate::request::RunRequest;
use crate::sandbox::{NativeContext, SandboxEngine};
use crate::semaphore::Semaphore;
use crate::transport::{BoxedReader, BoxedWriter};

/// Cheap, separately-locked mirror of the module slot's identity so
/// `STATUS` and `START`'s precondition checks never have to wait on
/// whatever lock RUNNER is holding for the duration of a guest call.
/// The real slot (§3, buffer + parsed module + instance) keeps its own
/// mutex, taken only for `LOAD` (install/teardown) and by RUNNER for the
/// span of a single call.
pub(crate) struct ModuleMeta {
    pub loaded: bool,
    pub module_id: Option<ModuleId>,
}

pub struct Agent<E: SandboxEngine> {
    pub(crate) config: AgentConfig,
    pub(crate) engine: E,

    pub(crate) module_meta: Mutex<ModuleMeta>,
    pub(crate) module_slot: Mutex<ModuleSlot<E>>,

    pub(crate) line_queue: Arc<LineQueue>,
    pub(crate) bin_sem: Arc<Semaphore>,
    pub(crate) job_sem: Arc<Semaphore>,
    pub(crate) framer: RxFramer,

    pub(crate) run_request: Mutex<Option<RunRequest>>,
    pub(crate) busy: AtomicBool,
    pub(crate) stop_requested: Arc<AtomicBool>,

    writer: Mutex<BoxedWriter>,
    gpio: Arc<Mutex<Box<dyn GpioPin>>>,
}

impl<E: SandboxEngine> Agent<E> {
    pub fn new(config: AgentConfig, engine: E, writer: BoxedWriter, gpio: Box<dyn GpioPin>) -> Self {
        let line_queue = Arc::new(LineQueue::new());
        let bin_sem = Arc::new(Semaphore::new(0));
        Self {
            config,
            engine,
            module_meta: Mutex::new(ModuleMeta {
                loaded: false,
                module_id: None,
            }),
            module_slot: Mutex::new(ModuleSlot::new()),
            framer: RxFramer::new(line_queue.clone(), bin_sem.clone()),
            line_queue,
            bin_sem,
            job_sem: Arc::new(Semaphore::new(0)),
            run_request: Mutex::new(None),
            busy: AtomicBool::new(false),
            stop_requested: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(writer),
            gpio: Arc::new(Mutex::new(gpio)),
        }
    }

    /// Writes one already-terminated reply line to the gateway. Failures
    /// are logged, never propagated as a panic. A wedged link must not
    /// bring down either thread (§7: "No panics propagate out of either
    /// thread").
    pub(crate) fn write_line(&self, line: &str) {
        use std::io::Write;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = writer.write_all(line.as_bytes()) {
            log::warn!("failed to write reply line: {err}");
        }
    }

    pub(crate) fn set_module_meta(&self, loaded: bool, module_id: Option<ModuleId>) {
        let mut meta = self.module_meta.lock().unwrap_or_else(|e| e.into_inner());
        meta.loaded = loaded;
        meta.module_id = module_id;
    }

    /// Builds a fresh [`NativeContext`] for a newly instantiated guest
    /// module: its own `stop_requested` clone (same underlying flag) and
    /// a `SharedGpio` handle to the one configured physical pin.
    pub(crate) fn make_native_context(&self) -> NativeContext {
        NativeContext {
            stop_requested: self.stop_requested.clone(),
            gpio: Box::new(SharedGpio(self.gpio.clone())),
            gpio_toggle_sleep: self.config.gpio_toggle_sleep(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Join handles for the three execution contexts spawned by [`spawn`].
pub struct AgentHandles {
    pub reader: JoinHandle<()>,
    pub comm: JoinHandle<()>,
    pub runner: JoinHandle<()>,
}

impl AgentHandles {
    /// Blocks until all three threads exit. Under normal operation none
    /// of them ever return, mirroring a firmware main loop that never
    /// returns either.
    pub fn join_all(self) {
        let _ = self.reader.join();
        let _ = self.comm.join();
        let _ = self.runner.join();
    }
}

/// The reader ("ISR-equivalent") loop: repeatedly reads whatever bytes
/// are currently available and feeds them to the RX framer. Never
/// blocks on anything but the next read (§4.2: "reads all currently
/// available bytes from the UART FIFO each invocation").
fn reader_loop(agent: Arc<Agent<impl SandboxEngine>>, mut reader: BoxedReader) {
    use std::io::{ErrorKind, Read};

    let mut buf = [0u8; 512];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => agent.framer.process_bytes(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                continue;
            }
            Err(e) => {
                log::error!("transport read failed, reader thread exiting: {e}");
                return;
            }
        }
    }
}

/// Spawns the reader, COMM, and RUNNER threads and emits the startup
/// greeting (§6: "emitted exactly once after successful init of the
/// framer, executor-engine, and GPIO").
pub fn spawn<E>(agent: Arc<Agent<E>>, reader: BoxedReader) -> AgentHandles
where
    E: SandboxEngine + Send + Sync + 'static,
{
    let greeting = protocol::hello(
        &agent.config.device_id,
        &agent.config.rtos,
        &agent.config.runtime,
        &agent.config.fw_version,
    );
    agent.write_line(&greeting);
    log::info!("agent started: {}", greeting.trim_end());

    let reader_agent = agent.clone();
    let reader_handle = std::thread::Builder::new()
        .name("agent-reader".into())
        .spawn(move || reader_loop(reader_agent, reader))
        .expect("failed to spawn reader thread");

    let comm_agent = agent.clone();
    let comm_handle = std::thread::Builder::new()
        .name("agent-comm".into())
        .spawn(move || crate::comm::comm_loop(comm_agent))
        .expect("failed to spawn COMM thread");

    let runner_agent = agent;
    let runner_handle = std::thread::Builder::new()
        .name("agent-runner".into())
        .spawn(move || crate::runner::runner_loop(runner_agent))
        .expect("failed to spawn RUNNER thread");

    AgentHandles {
        reader: reader_handle,
        comm: comm_handle,
        runner: runner_handle,
    }
}
