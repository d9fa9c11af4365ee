use super::command;
use super::ServiceManager;
use crate::error::Result;

/// systemd control through `systemctl`
pub struct Systemctl;

impl Systemctl {
    fn unit_op(&self, op: &str, unit: &str) -> Result<()> {
        command::run("systemctl", [op, unit])?;
        tracing::info!("systemctl {} {}", op, unit);
        Ok(())
    }
}

impl ServiceManager for Systemctl {
    fn daemon_reload(&self) -> Result<()> {
        command::run("systemctl", ["daemon-reload"])?;
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.unit_op("enable", unit)
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.unit_op("disable", unit)
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.unit_op("stop", unit)
    }

    fn restart(&self, unit: &str) -> Result<()> {
        self.unit_op("restart", unit)
    }

    fn reboot(&self) -> Result<()> {
        command::run("systemctl", ["reboot"])?;
        Ok(())
    }
}
