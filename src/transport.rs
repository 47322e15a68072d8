//! Outbound chat messages.

use crate::Error;

/// Something that can deliver chat messages to a target (a channel or a nickname).
pub trait Transport: Send + Sync {
    /// Sends a single line of text to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be queued for delivery.
    fn send_privmsg(&self, target: &str, message: &str) -> Result<(), Error>;

    /// Sends `text` to `target`, one message per line. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first delivery error, leaving the remaining lines unsent.
    fn send_lines(&self, target: &str, text: &str) -> Result<(), Error> {
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.send_privmsg(target, line)?;
        }

        Ok(())
    }
}

impl Transport for irc::client::Sender {
    fn send_privmsg(&self, target: &str, message: &str) -> Result<(), Error> {
        irc::client::Sender::send_privmsg(self, target, message)?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::Transport;
    use crate::Error;

    /// Records every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        unreachable: Vec<String>,
    }

    impl RecordingTransport {
        /// Returns a transport that fails to deliver anything to `target`.
        pub fn unreachable(target: &str) -> Self {
            RecordingTransport {
                unreachable: vec![target.to_string()],
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, target: &str) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(to, _)| to == target)
                .map(|(_, message)| message)
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send_privmsg(&self, target: &str, message: &str) -> Result<(), Error> {
            if self.unreachable.iter().any(|t| t == target) {
                return Err(Error::Irc(irc::error::Error::Io(std::io::Error::other(
                    "unreachable",
                ))));
            }

            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), message.to_string()));

            Ok(())
        }
    }
}
