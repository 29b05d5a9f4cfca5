use crate::measure::model::PointerEvent;
use std::fmt;
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCommand {
    ToggleMeasuring,
    Recalibrate,
    ClearAll,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    Pointer(PointerEvent),
    Command(OverlayCommand),
}

#[derive(Clone)]
enum Waker {
    /// Called on the producing thread.
    Inline(Arc<dyn Fn() + Send + Sync>),
    /// Signals a dedicated thread; wakes that pile up while it is busy
    /// collapse into one.
    Deferred(SyncSender<()>),
}

impl Waker {
    fn wake(&self) {
        match self {
            Self::Inline(waker) => waker(),
            Self::Deferred(tx) => {
                let _ = tx.try_send(());
            }
        }
    }
}

/// Producer half of the overlay event queue. Hook and hotkey threads hold a
/// clone each; sending never blocks and never touches overlay state.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: Sender<OverlayEvent>,
    waker: Option<Waker>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_waker", &self.waker.is_some())
            .finish()
    }
}

impl EventDispatcher {
    pub fn channel() -> (Self, Receiver<OverlayEvent>) {
        let (tx, rx) = channel();
        (Self { tx, waker: None }, rx)
    }

    /// Runs `waker` after every queued event so an idle UI loop wakes up.
    pub fn with_waker<W>(mut self, waker: W) -> Self
    where
        W: Fn() + Send + Sync + 'static,
    {
        self.waker = Some(Waker::Inline(Arc::new(waker)));
        self
    }

    /// Like [`EventDispatcher::with_waker`], but `waker` runs on its own
    /// `repaint-waker` thread. Producers only post a signal, so a waker that
    /// takes locks can never stall the pointer hook. The thread exits once
    /// every clone of the dispatcher is dropped.
    pub fn with_deferred_waker<W>(mut self, waker: W) -> anyhow::Result<Self>
    where
        W: Fn() + Send + 'static,
    {
        let (tx, rx) = sync_channel::<()>(1);
        thread::Builder::new()
            .name("repaint-waker".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    waker();
                }
                tracing::debug!("repaint waker stopped");
            })?;
        self.waker = Some(Waker::Deferred(tx));
        Ok(self)
    }

    pub fn dispatch(&self, event: OverlayEvent) -> bool {
        let sent = self.tx.send(event).is_ok();
        if sent {
            if let Some(waker) = &self.waker {
                waker.wake();
            }
        }
        sent
    }
}

pub fn drain_events(rx: &Receiver<OverlayEvent>) -> Vec<OverlayEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::model::PointerKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn events_from_two_producers_keep_their_order() {
        let (dispatcher, rx) = EventDispatcher::channel();
        let hook = dispatcher.clone();
        let hotkeys = dispatcher;

        hook.dispatch(OverlayEvent::Pointer(PointerEvent::new(
            PointerKind::SecondaryDown,
            (1, 2),
        )));
        hotkeys.dispatch(OverlayEvent::Command(OverlayCommand::ToggleMeasuring));
        hook.dispatch(OverlayEvent::Pointer(PointerEvent::new(
            PointerKind::SecondaryUp,
            (3, 4),
        )));

        let kinds: Vec<_> = drain_events(&rx)
            .into_iter()
            .map(|event| match event {
                OverlayEvent::Pointer(p) => format!("{:?}", p.kind),
                OverlayEvent::Command(c) => format!("{c:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["SecondaryDown", "ToggleMeasuring", "SecondaryUp"]);
    }

    #[test]
    fn waker_runs_once_per_delivered_event() {
        let woken = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&woken);
        let (dispatcher, rx) = EventDispatcher::channel();
        let dispatcher = dispatcher.with_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(dispatcher.dispatch(OverlayEvent::Command(OverlayCommand::ClearAll)));
        assert!(dispatcher.dispatch(OverlayEvent::Command(OverlayCommand::Close)));
        assert_eq!(woken.load(Ordering::SeqCst), 2);

        drop(rx);
        assert!(!dispatcher.dispatch(OverlayEvent::Command(OverlayCommand::Close)));
        assert_eq!(woken.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deferred_waker_runs_off_the_producing_thread() {
        let (woken_tx, woken_rx) = channel();
        let (dispatcher, rx) = EventDispatcher::channel();
        let dispatcher = dispatcher
            .with_deferred_waker(move || {
                let name = thread::current().name().map(str::to_owned);
                let _ = woken_tx.send(name);
            })
            .expect("spawn waker");

        assert!(dispatcher.dispatch(OverlayEvent::Command(OverlayCommand::ClearAll)));
        let name = woken_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("waker ran");
        assert_eq!(name.as_deref(), Some("repaint-waker"));
        assert_eq!(drain_events(&rx).len(), 1);
    }

    #[test]
    fn stuck_waker_does_not_stall_dispatch() {
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().expect("lock gate");
        let woken = Arc::new(AtomicUsize::new(0));
        let (dispatcher, rx) = EventDispatcher::channel();
        let dispatcher = {
            let gate = Arc::clone(&gate);
            let woken = Arc::clone(&woken);
            dispatcher
                .with_deferred_waker(move || {
                    let _guard = gate.lock();
                    woken.fetch_add(1, Ordering::SeqCst);
                })
                .expect("spawn waker")
        };

        for x in 0..100 {
            assert!(dispatcher.dispatch(OverlayEvent::Pointer(PointerEvent::new(
                PointerKind::Move,
                (x, 0),
            ))));
        }
        assert_eq!(drain_events(&rx).len(), 100);
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        drop(held);
        let deadline = Instant::now() + Duration::from_secs(5);
        while woken.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let wakes = woken.load(Ordering::SeqCst);
        assert!((1..=2).contains(&wakes), "wakes: {wakes}");
    }
}
