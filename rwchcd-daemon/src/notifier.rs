//! Alarm notifier: logs every delivered alarm, and if a notifier
//! program is configured, forks and `execvp`s it once per throttle
//! round with the batch's messages as argv (oldest alarm first). The
//! child is reaped by the SIGCHLD handler in `main`.

use std::ffi::CString;

use rwchcd_core::alarms::{Alarm, Notifier, Severity};

pub struct ProcessNotifier {
    path: Option<String>,
}

impl ProcessNotifier {
    pub fn new(path: Option<String>) -> Self {
        Self { path }
    }

    fn spawn(&self, path: &str, alarms: &[Alarm]) {
        let Ok(c_path) = CString::new(path) else {
            tracing::warn!(path, "alarm notifier path contains a NUL byte, skipping");
            return;
        };
        let c_args: Vec<CString> = alarms.iter().filter_map(|a| CString::new(a.message.as_str()).ok()).collect();

        let mut argv: Vec<*const libc::c_char> = Vec::with_capacity(c_args.len() + 2);
        argv.push(c_path.as_ptr());
        argv.extend(c_args.iter().map(|s| s.as_ptr()));
        argv.push(std::ptr::null());

        // Everything argv needs is already allocated; the child calls
        // nothing but execvp/_exit before replacing or exiting itself.
        let pid = unsafe { libc::fork() };
        match pid.cmp(&0) {
            std::cmp::Ordering::Equal => unsafe {
                libc::execvp(c_path.as_ptr(), argv.as_ptr());
                libc::_exit(127);
            },
            std::cmp::Ordering::Less => {
                tracing::warn!(error = %std::io::Error::last_os_error(), "failed to fork alarm notifier");
            }
            std::cmp::Ordering::Greater => {
                // Parent: reaped by the SIGCHLD handler.
            }
        }
    }
}

impl Notifier for ProcessNotifier {
    fn notify(&mut self, alarms: &[Alarm]) {
        for a in alarms {
            match a.severity {
                Severity::Critical => tracing::error!(source = %a.source, "{}", a.message),
                Severity::Warning => tracing::warn!(source = %a.source, "{}", a.message),
            }
        }
        if let Some(path) = self.path.clone() {
            self.spawn(&path, alarms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwchcd_core::timekeep::sec_to_tk;

    #[test]
    fn no_path_configured_is_a_log_only_no_op() {
        let mut n = ProcessNotifier::new(None);
        n.notify(&[Alarm {
            source: "boiler".into(),
            message: "hard-max exceeded".into(),
            severity: Severity::Critical,
            raised_at: sec_to_tk(1),
        }]);
    }
}
