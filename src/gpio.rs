//! GPIO driver collaborator (out of scope per §1: "the GPIO driver, treated
//! as one output pin with a toggle operation"). The concrete wiring to a
//! physical pin is a board-integration concern outside this crate's scope;
//! what the agent needs is the trait boundary.

/// A single output pin exposing one operation: toggle.
pub trait GpioPin: Send {
    fn toggle(&mut self) -> Result<(), String>;
}

/// Stand-in for the board's configured output pin (§4.2 `gpio_init_for_wasm`
/// in the original: one pin, configured output, initially inactive). Logs
/// each toggle rather than driving real hardware, since the physical GPIO
/// peripheral is an out-of-scope collaborator here.
pub struct LoggingOutputPin {
    name: &'static str,
    state: bool,
}

impl LoggingOutputPin {
    pub fn new(name: &'static str) -> Self {
        Self { name, state: false }
    }
}

impl GpioPin for LoggingOutputPin {
    fn toggle(&mut self) -> Result<(), String> {
        self.state = !self.state;
        log::info!("gpio[{}] -> {}", self.name, if self.state { "high" } else { "low" });
        Ok(())
    }
}

/// Shares a single physical pin across every guest instance: each `LOAD`
/// gets its own [`NativeContext`](crate::sandbox::NativeContext), but the
/// underlying pin is the one configured at agent startup, not a fresh one
/// per module.
pub struct SharedGpio(pub std::sync::Arc<std::sync::Mutex<Box<dyn GpioPin>>>);

impl GpioPin for SharedGpio {
    fn toggle(&mut self) -> Result<(), String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).toggle()
    }
}

/// Test fake that counts toggles instead of logging them, so end-to-end
/// scenarios can assert "GPIO pin observed to have toggled exactly once"
/// (§8 scenario 1) without a logger.
#[cfg(any(test, feature = "test-util"))]
pub struct CountingOutputPin {
    pub toggles: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(any(test, feature = "test-util"))]
impl CountingOutputPin {
    pub fn new() -> Self {
        Self {
            toggles: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicUsize> {
        self.toggles.clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl GpioPin for CountingOutputPin {
    fn toggle(&mut self) -> Result<(), String> {
        self.toggles.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
