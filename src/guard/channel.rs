//! Reading side of the outcome pipe.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use thiserror::Error;

use super::SignalOutcome;

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("cannot read outcome: {0}")]
    Io(#[from] io::Error),
    #[error("unknown outcome byte {0:#04x}")]
    Unknown(u8),
}

/// Decodes wire bytes written by the signal handler.
#[derive(Debug)]
pub struct OutcomeReceiver {
    pipe: File,
}

/// A close-on-exec pipe: the receiver plus the write end to hand to
/// [`OutcomeTarget::Channel`](super::OutcomeTarget::Channel).
pub fn outcome_channel() -> nix::Result<(OutcomeReceiver, OwnedFd)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    Ok((OutcomeReceiver { pipe: File::from(read) }, write))
}

impl OutcomeReceiver {
    /// Block for the next outcome. `None` once every writer has closed.
    pub fn recv(&mut self) -> Result<Option<SignalOutcome>, ReceiveError> {
        let mut byte = [0u8; 1];
        loop {
            match self.pipe.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    return SignalOutcome::from_wire(byte[0])
                        .map(Some)
                        .ok_or(ReceiveError::Unknown(byte[0]))
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl From<OwnedFd> for OutcomeReceiver {
    fn from(fd: OwnedFd) -> Self {
        Self { pipe: File::from(fd) }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn decodes_bytes_until_eof() {
        let (mut receiver, sender) = outcome_channel().unwrap();
        let mut sender = File::from(sender);
        sender.write_all(&[0, 1, 3]).unwrap();
        drop(sender);
        assert_eq!(receiver.recv().unwrap(), Some(SignalOutcome::ExitRequested));
        assert_eq!(receiver.recv().unwrap(), Some(SignalOutcome::Orphaned));
        assert_eq!(receiver.recv().unwrap(), Some(SignalOutcome::UnexpectedSender));
        assert_eq!(receiver.recv().unwrap(), None);
    }

    #[test]
    fn unknown_byte_is_an_error() {
        let (mut receiver, sender) = outcome_channel().unwrap();
        File::from(sender).write_all(&[9]).unwrap();
        assert!(matches!(receiver.recv(), Err(ReceiveError::Unknown(9))));
    }
}
