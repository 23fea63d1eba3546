//! Two-stage interrupt handling
//!
//! The first termination signal moves the controller from `Idle` to
//! `Draining`: the cancellation token fires, the `on_first` callback runs and
//! a registered delegate (a child process) receives the same signal. The
//! worker finishes its current item and stops. A second signal moves to
//! `Forced`: `on_second` runs, the delegate is killed and the listener exits
//! the process immediately.

use std::fmt;
use std::sync::Arc;

use log::{error, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit code used when the process is terminated by a forced interrupt
pub const FORCED_EXIT_CODE: i32 = 130;

/// Termination request received from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "interrupt"),
            Signal::Terminate => write!(f, "terminate"),
        }
    }
}

/// Escalation stage, only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InterruptStage {
    Idle,
    Draining,
    Forced,
}

/// External work that should follow the controller's escalation
pub trait InterruptDelegate: Send + Sync {
    /// Forward the first termination signal
    fn interrupt(&self, signal: Signal);

    /// Terminate unconditionally after a second signal
    fn kill(&self);
}

type Callback = Box<dyn FnOnce() + Send>;

/// Handle for callbacks added with [`InterruptController::push_callbacks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

struct Registration {
    id: CallbackId,
    on_first: Option<Callback>,
    on_second: Option<Callback>,
}

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    registered: Vec<Registration>,
}

impl Callbacks {
    fn push(&mut self, on_first: Callback, on_second: Callback) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.registered.push(Registration {
            id,
            on_first: Some(on_first),
            on_second: Some(on_second),
        });
        id
    }

    /// Take the callbacks for one stage, most recently pushed first
    fn take(&mut self, stage: InterruptStage) -> Vec<Callback> {
        self.registered
            .iter_mut()
            .rev()
            .filter_map(|r| match stage {
                InterruptStage::Draining => r.on_first.take(),
                InterruptStage::Forced => r.on_second.take(),
                InterruptStage::Idle => None,
            })
            .collect()
    }
}

struct Inner {
    stage: Mutex<InterruptStage>,
    cancel: CancellationToken,
    delegate: Mutex<Option<Arc<dyn InterruptDelegate>>>,
    callbacks: Mutex<Callbacks>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Observes termination requests and drives the Idle/Draining/Forced machine
///
/// Clones share state; the listener task holds one clone.
#[derive(Clone)]
pub struct InterruptController {
    inner: Arc<Inner>,
}

impl fmt::Debug for InterruptController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptController")
            .field("stage", &self.stage())
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stage: Mutex::new(InterruptStage::Idle),
                cancel: CancellationToken::new(),
                delegate: Mutex::new(None),
                callbacks: Mutex::new(Callbacks::default()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// True once the first termination signal has been received
    pub fn stop_requested(&self) -> bool {
        self.stage() >= InterruptStage::Draining
    }

    pub fn stage(&self) -> InterruptStage {
        *self.inner.stage.lock()
    }

    /// Token cancelled on the Idle -> Draining transition
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Register callbacks and start listening for OS signals
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, S>(&self, on_first: F, on_second: S)
    where
        F: FnOnce() + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        self.register(on_first, on_second);
        self.listen();
    }

    /// Register the stage callbacks without installing signal handlers
    ///
    /// Each callback runs at most once. Every previously registered
    /// callback is dropped.
    pub fn register<F, S>(&self, on_first: F, on_second: S)
    where
        F: FnOnce() + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        callbacks.registered.clear();
        callbacks.push(Box::new(on_first), Box::new(on_second));
    }

    /// Add stage callbacks on top of those already registered
    ///
    /// On a transition the most recently pushed callback runs first. Remove
    /// them again with [`remove_callbacks`](Self::remove_callbacks).
    pub fn push_callbacks<F, S>(&self, on_first: F, on_second: S) -> CallbackId
    where
        F: FnOnce() + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .push(Box::new(on_first), Box::new(on_second))
    }

    /// Drop callbacks added by `push_callbacks`, leaving all others in place
    pub fn remove_callbacks(&self, id: CallbackId) {
        self.inner
            .callbacks
            .lock()
            .registered
            .retain(|r| r.id != id);
    }

    /// Spawn the signal listener if it is not already running
    ///
    /// Returns true if this call started the listener.
    pub fn listen(&self) -> bool {
        let mut listener = self.inner.listener.lock();
        if listener.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *listener = Some(tokio::spawn(listen_for_signals(self.clone())));
        true
    }

    /// Abort the signal listener, keeping registered callbacks
    pub fn stop_listening(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.inner
            .listener
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop listening and drop pending callbacks
    ///
    /// The stage is kept: a controller never returns to `Idle`.
    pub fn disarm(&self) {
        self.stop_listening();
        self.inner.callbacks.lock().registered.clear();
    }

    /// Register external work that should receive forwarded signals
    pub fn set_delegate(&self, delegate: Arc<dyn InterruptDelegate>) {
        *self.inner.delegate.lock() = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        self.inner.delegate.lock().take();
    }

    /// Apply one termination signal and return the resulting stage
    ///
    /// This is the single transition function of the state machine; the
    /// listener task calls it for every OS signal. Signals received in
    /// `Forced` are ignored.
    pub fn on_signal(&self, signal: Signal) -> InterruptStage {
        let next = {
            let mut stage = self.inner.stage.lock();
            let next = match *stage {
                InterruptStage::Idle => InterruptStage::Draining,
                InterruptStage::Draining => InterruptStage::Forced,
                InterruptStage::Forced => return InterruptStage::Forced,
            };
            *stage = next;
            next
        };

        let delegate = self.inner.delegate.lock().clone();
        let callbacks = self.inner.callbacks.lock().take(next);

        match next {
            InterruptStage::Draining => {
                warn!(
                    "Received {} signal, finishing current item (send again to force exit)",
                    signal
                );
                self.inner.cancel.cancel();

                for callback in callbacks {
                    callback();
                }
                if let Some(delegate) = delegate {
                    delegate.interrupt(signal);
                }
            }
            InterruptStage::Forced => {
                warn!("Received second {} signal, forcing exit", signal);

                for callback in callbacks {
                    callback();
                }
                if let Some(delegate) = delegate {
                    delegate.kill();
                }
            }
            InterruptStage::Idle => {}
        }

        next
    }
}

async fn listen_for_signals(controller: InterruptController) {
    let Some(mut signals) = SignalStream::install() else {
        return;
    };
    while let Some(signal) = signals.recv().await {
        // Callbacks may write checkpoints and the delegate signals processes
        let handler = controller.clone();
        let stage = match tokio::task::spawn_blocking(move || handler.on_signal(signal)).await {
            Ok(stage) => stage,
            Err(e) => {
                error!("Interrupt handler failed: {}", e);
                controller.stage()
            }
        };
        if stage == InterruptStage::Forced {
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}

#[cfg(unix)]
struct SignalStream {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalStream {
    fn install() -> Option<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(interrupt), Ok(terminate)) => Some(Self {
                interrupt,
                terminate,
            }),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                None
            }
        }
    }

    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(Signal::Interrupt),
            Some(()) = self.terminate.recv() => Some(Signal::Terminate),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalStream;

#[cfg(not(unix))]
impl SignalStream {
    fn install() -> Option<Self> {
        Some(Self)
    }

    async fn recv(&mut self) -> Option<Signal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(Signal::Interrupt),
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingDelegate {
        signals: Mutex<Vec<Signal>>,
        kills: AtomicUsize,
    }

    impl InterruptDelegate for RecordingDelegate {
        fn interrupt(&self, signal: Signal) {
            self.signals.lock().push(signal);
        }

        fn kill(&self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_callbacks(controller: &InterruptController) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&first);
        let s = Arc::clone(&second);
        controller.register(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                s.fetch_add(1, Ordering::SeqCst);
            },
        );
        (first, second)
    }

    #[test]
    fn test_starts_idle() {
        let controller = InterruptController::new();
        assert_eq!(controller.stage(), InterruptStage::Idle);
        assert!(!controller.stop_requested());
        assert!(!controller.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let controller = InterruptController::new();
        let (first, second) = counting_callbacks(&controller);

        assert_eq!(controller.on_signal(Signal::Terminate), InterruptStage::Draining);
        assert!(controller.stop_requested());
        assert!(controller.cancellation_token().is_cancelled());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        assert_eq!(controller.on_signal(Signal::Interrupt), InterruptStage::Forced);
        assert_eq!(controller.on_signal(Signal::Interrupt), InterruptStage::Forced);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(controller.stage(), InterruptStage::Forced);
    }

    #[test]
    fn test_delegate_follows_escalation() {
        let controller = InterruptController::new();
        let delegate = Arc::new(RecordingDelegate::default());
        controller.set_delegate(delegate.clone());

        controller.on_signal(Signal::Terminate);
        assert_eq!(*delegate.signals.lock(), vec![Signal::Terminate]);
        assert_eq!(delegate.kills.load(Ordering::SeqCst), 0);

        controller.on_signal(Signal::Terminate);
        assert_eq!(delegate.signals.lock().len(), 1);
        assert_eq!(delegate.kills.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleared_delegate_is_not_notified() {
        let controller = InterruptController::new();
        let delegate = Arc::new(RecordingDelegate::default());
        controller.set_delegate(delegate.clone());
        controller.clear_delegate();

        controller.on_signal(Signal::Interrupt);
        assert!(delegate.signals.lock().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let controller = InterruptController::new();
        let clone = controller.clone();
        clone.on_signal(Signal::Interrupt);
        assert!(controller.stop_requested());
    }

    #[tokio::test]
    async fn test_disarm_drops_callbacks_and_keeps_stage() {
        let controller = InterruptController::new();
        let first = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&first);
        controller.arm(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        );
        assert!(controller.is_listening());

        controller.disarm();
        assert!(!controller.is_listening());

        controller.on_signal(Signal::Interrupt);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(controller.stage(), InterruptStage::Draining);

        controller.disarm();
        assert_eq!(controller.stage(), InterruptStage::Draining);
    }

    #[test]
    fn test_pushed_callbacks_stack_on_registered() {
        let controller = InterruptController::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
        controller.register(move || o1.lock().push("outer"), move || o2.lock().push("outer"));
        let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
        controller.push_callbacks(move || o1.lock().push("inner"), move || o2.lock().push("inner"));

        controller.on_signal(Signal::Interrupt);
        assert_eq!(*order.lock(), vec!["inner", "outer"]);

        controller.on_signal(Signal::Interrupt);
        assert_eq!(*order.lock(), vec!["inner", "outer", "inner", "outer"]);
    }

    #[test]
    fn test_remove_callbacks_keeps_others() {
        let controller = InterruptController::new();
        let (first, _) = counting_callbacks(&controller);
        let pushed = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pushed);
        let id = controller.push_callbacks(
            move || {
                p.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        );

        controller.remove_callbacks(id);
        controller.on_signal(Signal::Interrupt);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(pushed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listen_reports_whether_it_started() {
        let controller = InterruptController::new();
        assert!(controller.listen());
        assert!(!controller.listen());

        controller.stop_listening();
        assert!(!controller.is_listening());
        assert!(controller.listen());
        controller.disarm();
    }

    #[tokio::test]
    async fn test_token_wakes_waiters() {
        let controller = InterruptController::new();
        let token = controller.cancellation_token();
        let waiter = tokio::spawn(async move { token.cancelled().await });

        controller.on_signal(Signal::Interrupt);
        waiter.await.unwrap();
    }
}
