//! Host service lifecycle around a file system.
//!
//! The host process decides what a service is; this module only keeps the
//! start/stop state machine and routes control codes to [`ServiceHooks`].

use crate::error::{FsError, Result};
use crate::status::NtStatus;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Control codes delivered by the host.
pub mod control {
    pub const STOP: u32 = 1;
    pub const PAUSE: u32 = 2;
    pub const CONTINUE: u32 = 3;
    pub const INTERROGATE: u32 = 4;
    pub const SHUTDOWN: u32 = 5;
    /// First code of the user-defined range (inclusive).
    pub const USER_FIRST: u32 = 128;
    /// Last code of the user-defined range (inclusive).
    pub const USER_LAST: u32 = 255;
}

/// Bits of the accept mask.
pub mod accept {
    pub const STOP: u32 = 0x1;
    pub const PAUSE_CONTINUE: u32 = 0x2;
    pub const SHUTDOWN: u32 = 0x4;
}

pub trait ServiceHooks: Send + Sync {
    fn on_start(&self, args: &[String]) -> Result<()>;

    /// Called on stop or shutdown. May run while dispatcher workers are
    /// still draining requests.
    fn on_stop(&self) -> Result<()>;

    /// Pause, continue and user-defined codes.
    fn on_control(&self, _code: u32) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            3 => ServiceState::Stopping,
            _ => ServiceState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ServiceState::Stopped => 0,
            ServiceState::Starting => 1,
            ServiceState::Running => 2,
            ServiceState::Stopping => 3,
        }
    }
}

pub struct Service<H: ServiceHooks> {
    name: String,
    hooks: H,
    accept: u32,
    state: AtomicU8,
}

impl<H: ServiceHooks> Service<H> {
    /// A service accepting stop and shutdown.
    pub fn new(name: impl Into<String>, hooks: H) -> Self {
        Self::with_accept(name, hooks, accept::STOP | accept::SHUTDOWN)
    }

    pub fn with_accept(name: impl Into<String>, hooks: H, accept: u32) -> Self {
        Self {
            name: name.into(),
            hooks,
            accept,
            state: AtomicU8::new(ServiceState::Stopped.as_u8()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn accept_mask(&self) -> u32 {
        self.accept
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, op: &str, from: ServiceState, to: ServiceState) -> Result<()> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| {
                FsError::lifecycle(
                    op,
                    format!(
                        "service {} is {:?}, expected {:?}",
                        self.name,
                        ServiceState::from_u8(actual),
                        from
                    ),
                )
            })
    }

    fn set_state(&self, state: ServiceState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Run `on_start`. A failing hook leaves the service stopped.
    pub fn start(&self, args: &[String]) -> Result<()> {
        self.transition("start", ServiceState::Stopped, ServiceState::Starting)?;
        match self.hooks.on_start(args) {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                info!(service = %self.name, "Service running");
                Ok(())
            }
            Err(e) => {
                self.set_state(ServiceState::Stopped);
                warn!(service = %self.name, error = %e, "Service failed to start");
                Err(e)
            }
        }
    }

    /// Run `on_stop`. The service ends up stopped even if the hook fails.
    pub fn stop(&self) -> Result<()> {
        self.transition("stop", ServiceState::Running, ServiceState::Stopping)?;
        let result = self.hooks.on_stop();
        self.set_state(ServiceState::Stopped);
        match &result {
            Ok(()) => info!(service = %self.name, "Service stopped"),
            Err(e) => warn!(service = %self.name, error = %e, "Service stop hook failed"),
        }
        result
    }

    fn accepts(&self, code: u32) -> bool {
        match code {
            control::STOP => self.accept & accept::STOP != 0,
            control::PAUSE | control::CONTINUE => self.accept & accept::PAUSE_CONTINUE != 0,
            control::SHUTDOWN => self.accept & accept::SHUTDOWN != 0,
            control::INTERROGATE => true,
            control::USER_FIRST..=control::USER_LAST => true,
            _ => false,
        }
    }

    /// Route a host control code. Codes outside the accept mask are
    /// rejected with `InvalidDeviceRequest`.
    pub fn control(&self, code: u32) -> Result<()> {
        if !self.accepts(code) {
            debug!(service = %self.name, code, "Control code rejected");
            return Err(FsError::Status(NtStatus::InvalidDeviceRequest));
        }
        match code {
            control::STOP | control::SHUTDOWN => self.stop(),
            control::INTERROGATE => Ok(()),
            _ => {
                if self.state() != ServiceState::Running {
                    return Err(FsError::lifecycle("control", "service is not running"));
                }
                self.hooks.on_control(code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
        stops: AtomicUsize,
        controls: AtomicUsize,
        fail_start: bool,
    }

    impl ServiceHooks for Counting {
        fn on_start(&self, _args: &[String]) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(FsError::invalid("bad args"));
            }
            Ok(())
        }

        fn on_stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_control(&self, _code: u32) -> Result<()> {
            self.controls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_start_stop() {
        let svc = Service::new("memfs", Counting::default());
        svc.start(&[]).unwrap();
        assert_eq!(svc.state(), ServiceState::Running);
        assert!(svc.start(&[]).is_err());
        svc.stop().unwrap();
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(svc.stop().is_err());
        assert_eq!(svc.hooks().stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_start_stays_stopped() {
        let svc = Service::new(
            "memfs",
            Counting {
                fail_start: true,
                ..Default::default()
            },
        );
        assert!(svc.start(&[]).is_err());
        assert_eq!(svc.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_control_respects_accept_mask() {
        let svc = Service::new("memfs", Counting::default());
        svc.start(&[]).unwrap();

        let err = svc.control(control::PAUSE).unwrap_err();
        assert_eq!(err.status(), NtStatus::InvalidDeviceRequest);
        assert!(svc.control(77).is_err());
        svc.control(control::INTERROGATE).unwrap();
        svc.control(200).unwrap();
        assert_eq!(svc.hooks().controls.load(Ordering::SeqCst), 1);

        svc.control(control::STOP).unwrap();
        assert_eq!(svc.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_pause_when_accepted() {
        let svc = Service::with_accept(
            "memfs",
            Counting::default(),
            accept::STOP | accept::PAUSE_CONTINUE,
        );
        assert!(svc.control(control::PAUSE).is_err());
        svc.start(&[]).unwrap();
        svc.control(control::PAUSE).unwrap();
        svc.control(control::CONTINUE).unwrap();
        assert!(svc.control(control::SHUTDOWN).is_err());
    }
}
