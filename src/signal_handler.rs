use crate::logging::error_msg;
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Interrupt, terminate, hang-up or quit: stop the run.
    Abort,
    Suspend,
    Resume,
}

pub fn spawn_signal_handler() -> mpsc::UnboundedReceiver<SignalEvent> {
    let (tx, rx) = mpsc::unbounded_channel::<SignalEvent>();

    tokio::spawn(async move {
        macro_rules! register_signal {
            ($kind:expr) => {
                match signal($kind) {
                    Ok(s) => s,
                    Err(e) => {
                        error_msg!("Failed to register signal handler: {e}");
                        return;
                    }
                }
            };
        }

        let mut sigint = register_signal!(SignalKind::interrupt());
        let mut sigterm = register_signal!(SignalKind::terminate());
        let mut sighup = register_signal!(SignalKind::hangup());
        let mut sigtstp = register_signal!(SignalKind::from_raw(libc::SIGTSTP));
        let mut sigcont = register_signal!(SignalKind::from_raw(libc::SIGCONT));
        let mut sigquit = register_signal!(SignalKind::quit());

        loop {
            let event = tokio::select! {
                _ = sigint.recv() => SignalEvent::Abort,
                _ = sigterm.recv() => SignalEvent::Abort,
                _ = sighup.recv() => SignalEvent::Abort,
                _ = sigquit.recv() => SignalEvent::Abort,
                _ = sigtstp.recv() => SignalEvent::Suspend,
                _ = sigcont.recv() => SignalEvent::Resume,
            };
            if tx.send(event).is_err() || event == SignalEvent::Abort {
                break;
            }
        }
    });

    rx
}
