//! Desktop popups through the platform's notification command.

use tokio::process::Command;

use crate::error::{HubError, Result};

use super::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopNotifier {
    /// `notify-send` (libnotify).
    NotifySend,
    /// `osascript` on macOS.
    AppleScript,
}

impl DesktopNotifier {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            DesktopNotifier::AppleScript
        } else {
            DesktopNotifier::NotifySend
        }
    }

    fn command(&self, alert: &Alert) -> Command {
        match self {
            DesktopNotifier::NotifySend => {
                let mut cmd = Command::new("notify-send");
                cmd.arg(&alert.title).arg(&alert.body);
                cmd
            }
            DesktopNotifier::AppleScript => {
                let script = format!(
                    "display notification {} with title {} sound name \"Glass\"",
                    apple_quote(&alert.body),
                    apple_quote(&alert.title)
                );
                let mut cmd = Command::new("osascript");
                cmd.arg("-e").arg(script);
                cmd
            }
        }
    }

    pub async fn show(&self, alert: &Alert) -> Result<()> {
        let output = self.command(alert).kill_on_drop(true).output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(HubError::Io(std::io::Error::other(format!(
                "{:?} exited with {}: {}",
                self,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))))
        }
    }
}

/// AppleScript string literal.
fn apple_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
