//! Signalling and memory accounting for a solver's whole process tree.
//!
//! Every solver runs in its own process group whose id is the pid of the
//! group leader, so signals go to the group with `killpg`.

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid as NixPid;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Time a terminated process tree gets before it is killed.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_millis(500);

pub fn get_process_tree_memory(system: &System, root_pid: u32) -> u64 {
    process_tree_pids(system, root_pid)
        .into_iter()
        .filter_map(|pid| system.process(pid))
        .map(|process| process.memory())
        .sum()
}

/// `root_pid` and all its live descendants.
pub fn process_tree_pids(system: &System, root_pid: u32) -> Vec<Pid> {
    let root_pid = Pid::from_u32(root_pid);
    let mut tree = Vec::new();
    let mut pids_to_check = vec![root_pid];

    while let Some(pid) = pids_to_check.pop() {
        if system.process(pid).is_some() {
            tree.push(pid);
            for (child_pid, child_process) in system.processes() {
                if child_process.parent() == Some(pid) {
                    pids_to_check.push(*child_pid);
                }
            }
        }
    }

    tree
}

/// Sends `signals` in order to the process group led by `pid`. A group that
/// no longer exists is not an error.
pub fn send_signals_to_process_tree(pid: u32, signals: Vec<Signal>) -> nix::Result<()> {
    let pgid = NixPid::from_raw(pid as i32);
    for signal in signals {
        match killpg(pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Waits for the grace period, then kills the group led by `pid` and every
/// descendant that left it. Blocks the calling thread.
pub fn recursive_force_kill(pid: u32) -> nix::Result<()> {
    let descendants = descendants(pid);
    std::thread::sleep(KILL_GRACE_PERIOD);
    kill_all(pid, descendants)
}

/// Kills the group led by `pid` and every descendant that left it, now.
pub fn force_kill(pid: u32) -> nix::Result<()> {
    kill_all(pid, descendants(pid))
}

fn descendants(pid: u32) -> Vec<Pid> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing(),
    );
    process_tree_pids(&system, pid)
}

fn kill_all(pid: u32, descendants: Vec<Pid>) -> nix::Result<()> {
    send_signals_to_process_tree(pid, vec![Signal::SIGKILL])?;
    for descendant in descendants {
        match nix::sys::signal::kill(NixPid::from_raw(descendant.as_u32() as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::os::unix::process::CommandExt;

    #[test]
    fn test_tree_contains_children() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 5 & sleep 5; wait"])
            .process_group(0)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let tree = process_tree_pids(&system, child.id());
        assert!(tree.len() >= 3, "expected shell and two sleeps, got {tree:?}");

        recursive_force_kill(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_signalling_a_dead_group_is_ok() {
        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        child.wait().unwrap();
        assert!(send_signals_to_process_tree(child.id(), vec![Signal::SIGTERM]).is_ok());
    }

    #[test]
    fn test_force_kill_ignores_sigterm_handlers() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; while :; do sleep 0.2; done"])
            .process_group(0)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        send_signals_to_process_tree(child.id(), vec![Signal::SIGTERM]).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_none());

        force_kill(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
