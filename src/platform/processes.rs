use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::ProcessLookup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub exe_path: String,
    pub exe_name: String,
    pub working_dir: Option<String>,
    pub cmd_args: Vec<String>,
}

impl ProcessInfo {
    pub fn from_exe_path(exe_path: &str) -> Self {
        Self {
            exe_path: exe_path.to_string(),
            exe_name: exe_base_name(exe_path),
            working_dir: None,
            cmd_args: Vec::new(),
        }
    }
}

/// Base name of an executable path, accepting both separator styles so
/// Windows paths parse the same on every host.
pub fn exe_base_name(exe_path: &str) -> String {
    exe_path
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(exe_path)
        .to_string()
}

/// Resolves process metadata through `sysinfo`, refreshing only the pid asked
/// for.
pub struct SysinfoProcesses {
    system: Mutex<System>,
}

impl SysinfoProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLookup for SysinfoProcesses {
    fn process_info(&self, pid: u32) -> Option<ProcessInfo> {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pid = Pid::from_u32(pid);

        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );

        let process = system.process(pid)?;
        let exe_path = process
            .exe()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();
        let exe_name = if exe_path.is_empty() {
            process.name().to_string_lossy().into_owned()
        } else {
            exe_base_name(&exe_path)
        };

        Some(ProcessInfo {
            exe_path,
            exe_name,
            working_dir: process
                .cwd()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(|dir| dir.to_string_lossy().into_owned()),
            cmd_args: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(exe_base_name("C:\\Program Files\\Code\\Code.exe"), "Code.exe");
        assert_eq!(exe_base_name("/usr/bin/code"), "code");
        assert_eq!(exe_base_name("notepad.exe"), "notepad.exe");
    }

    #[test]
    fn resolves_own_process() {
        let lookup = SysinfoProcesses::new();
        let info = lookup
            .process_info(std::process::id())
            .expect("own process is visible");
        assert!(!info.exe_name.is_empty());
    }
}
