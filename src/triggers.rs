//! External triggers
//!
//! Process signals and companion window keys are mapped to player actions
//! through one table. Signal handlers only raise a flag; the flags are
//! drained on the render loop.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use winit::keyboard::{Key, NamedKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Recenter,
    /// Bring the surface closer
    ZoomIn,
    ZoomOut,
    Quit,
}

impl Action {
    /// Zoom change for zoom actions
    pub fn zoom_delta(self) -> Option<f64> {
        match self {
            Action::ZoomIn => Some(-crate::resize::ZOOM_STEP),
            Action::ZoomOut => Some(crate::resize::ZOOM_STEP),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKey {
    W,
    Q,
    E,
    Escape,
}

impl TriggerKey {
    pub fn from_logical(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(Self::Escape),
            Key::Character(c) => match c.as_str() {
                "w" | "W" => Some(Self::W),
                "q" | "Q" => Some(Self::Q),
                "e" | "E" => Some(Self::E),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTrigger {
    Signal(libc::c_int),
    Key(TriggerKey),
}

/// Number of signal flags, one per signal number
pub const SIGNAL_SLOTS: usize = 65;

/// Flags set by the installed handlers
static PENDING_SIGNALS: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];

fn flag_for(flags: &[AtomicBool], signal: libc::c_int) -> Option<&AtomicBool> {
    usize::try_from(signal).ok().and_then(|i| flags.get(i))
}

extern "C" fn on_signal(signal: libc::c_int) {
    if let Some(flag) = flag_for(&PENDING_SIGNALS, signal) {
        flag.store(true, Ordering::SeqCst);
    }
}

pub struct TriggerTable {
    entries: Vec<(ExternalTrigger, Action)>,
    flags: &'static [AtomicBool],
}

impl TriggerTable {
    pub fn new(entries: Vec<(ExternalTrigger, Action)>) -> Self {
        Self {
            entries,
            flags: &PENDING_SIGNALS,
        }
    }

    /// Read signals from `flags` instead of the flags the installed handlers
    /// set. Tables over separate flags never see each other's signals.
    pub fn with_flags(mut self, flags: &'static [AtomicBool]) -> Self {
        self.flags = flags;
        self
    }

    /// Mark `signal` as received in this table's flags, as a handler would.
    #[cfg(test)]
    fn notify(&self, signal: libc::c_int) {
        if let Some(flag) = flag_for(self.flags, signal) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Keys W/Q/E/Escape and both user signals
    pub fn standard() -> Self {
        Self::new(vec![
            (ExternalTrigger::Signal(libc::SIGUSR1), Action::Recenter),
            (ExternalTrigger::Signal(libc::SIGUSR2), Action::Recenter),
            (ExternalTrigger::Key(TriggerKey::W), Action::Recenter),
            (ExternalTrigger::Key(TriggerKey::Q), Action::ZoomIn),
            (ExternalTrigger::Key(TriggerKey::E), Action::ZoomOut),
            (ExternalTrigger::Key(TriggerKey::Escape), Action::Quit),
        ])
    }

    pub fn action_for(&self, trigger: ExternalTrigger) -> Option<Action> {
        self.entries
            .iter()
            .find(|(t, _)| *t == trigger)
            .map(|(_, action)| *action)
    }

    pub fn key_action(&self, key: &Key) -> Option<Action> {
        TriggerKey::from_logical(key).and_then(|k| self.action_for(ExternalTrigger::Key(k)))
    }

    fn signals(&self) -> impl Iterator<Item = (libc::c_int, Action)> + '_ {
        self.entries.iter().filter_map(|(trigger, action)| match trigger {
            ExternalTrigger::Signal(signal) => Some((*signal, *action)),
            ExternalTrigger::Key(_) => None,
        })
    }

    pub fn install_signal_handlers(&self) -> io::Result<()> {
        for (signal, action) in self.signals() {
            let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // SAFETY: the handler only stores to a static atomic
            let previous = unsafe { libc::signal(signal, handler) };
            if previous == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
            info!("signal {signal} -> {action:?}");
        }
        Ok(())
    }

    /// Actions for every signal received since the last call
    pub fn drain_signals(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        for (signal, action) in self.signals() {
            let fired = flag_for(self.flags, signal).is_some_and(|flag| flag.swap(false, Ordering::SeqCst));
            if fired {
                debug!("signal {signal} received");
                actions.push(action);
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn keys_map_to_actions() {
        let table = TriggerTable::standard();
        let key = |s: &str| Key::Character(SmolStr::new(s));
        assert_eq!(table.key_action(&key("w")), Some(Action::Recenter));
        assert_eq!(table.key_action(&key("W")), Some(Action::Recenter));
        assert_eq!(table.key_action(&key("q")), Some(Action::ZoomIn));
        assert_eq!(table.key_action(&key("e")), Some(Action::ZoomOut));
        assert_eq!(table.key_action(&Key::Named(NamedKey::Escape)), Some(Action::Quit));
        assert_eq!(table.key_action(&key("x")), None);
        assert_eq!(table.key_action(&Key::Named(NamedKey::Enter)), None);
    }

    #[test]
    fn zoom_actions_step_by_a_hundredth() {
        assert_eq!(Action::ZoomIn.zoom_delta(), Some(-0.01));
        assert_eq!(Action::ZoomOut.zoom_delta(), Some(0.01));
        assert_eq!(Action::Recenter.zoom_delta(), None);
    }

    #[test]
    fn both_user_signals_recenter() {
        static FLAGS: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];
        let table = TriggerTable::standard().with_flags(&FLAGS);
        assert_eq!(table.action_for(ExternalTrigger::Signal(libc::SIGUSR1)), Some(Action::Recenter));
        assert_eq!(table.action_for(ExternalTrigger::Signal(libc::SIGUSR2)), Some(Action::Recenter));
        assert!(table.drain_signals().is_empty());

        table.notify(libc::SIGUSR1);
        assert_eq!(table.drain_signals(), vec![Action::Recenter]);
        assert!(table.drain_signals().is_empty());

        table.notify(libc::SIGUSR1);
        table.notify(libc::SIGUSR2);
        assert_eq!(table.drain_signals(), vec![Action::Recenter, Action::Recenter]);
    }

    #[test]
    fn separate_flags_do_not_share_signals() {
        static FIRST: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];
        static SECOND: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];
        let first = TriggerTable::standard().with_flags(&FIRST);
        let second = TriggerTable::standard().with_flags(&SECOND);

        first.notify(libc::SIGUSR2);
        assert!(second.drain_signals().is_empty());
        assert_eq!(first.drain_signals(), vec![Action::Recenter]);

        // out of range signal numbers are ignored
        first.notify(SIGNAL_SLOTS as libc::c_int);
        first.notify(-1);
        assert!(first.drain_signals().is_empty());
    }

    #[test]
    fn installed_handler_sets_process_flags() {
        // the only test that reads the process-wide flags
        let table = TriggerTable::standard();
        table.install_signal_handlers().unwrap();
        assert!(table.drain_signals().is_empty());

        // SAFETY: handlers installed above
        unsafe {
            libc::raise(libc::SIGUSR1);
        }
        assert_eq!(table.drain_signals(), vec![Action::Recenter]);
    }
}
