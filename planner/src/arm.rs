use std::{
    fmt,
    io::{ErrorKind, Read, Write},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{
    config::SerialConfig,
    error::{Error, Result},
    termdev::{PortReader, PortWriter, SerialPort},
};

/// How long a single read on the arm link may block before the timeout is rechecked.
/// `VTIME` counts tenths of a second, so this is the shortest slice a tty allows.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One of the two serial links of the rig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Robot,
    Gripper,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Robot => write!(f, "robot"),
            Channel::Gripper => write!(f, "gripper"),
        }
    }
}

/// Everything the choreography needs from the hardware.
pub trait Transport {
    /// Writes one command line. Does not wait for the device.
    fn send(&mut self, channel: Channel, command: &str) -> Result<()>;

    /// Blocks until the device on `channel` reports back, returning how long that took.
    /// Gives up with [`Error::TransportTimeout`] once `timeout` has passed.
    fn await_acknowledgement(&mut self, channel: Channel, timeout: Duration) -> Result<Duration>;

    /// Lets the mechanics settle.
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, channel: Channel, command: &str) -> Result<()> {
        (**self).send(channel, command)
    }

    fn await_acknowledgement(&mut self, channel: Channel, timeout: Duration) -> Result<Duration> {
        (**self).await_acknowledgement(channel, timeout)
    }

    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// The arm and the gripper, each on its own tty.
pub struct SerialTransport {
    robot_reader: PortReader,
    robot_writer: PortWriter,
    gripper: PortWriter,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut robot = SerialPort::open(&config.robot_port)?;
        robot.configure(config.baud_rate, POLL_INTERVAL)?;
        let (robot_reader, robot_writer) = robot.split();

        let mut gripper = SerialPort::open(&config.gripper_port)?;
        gripper.configure(config.baud_rate, POLL_INTERVAL)?;
        let (_, gripper) = gripper.split();

        info!(
            robot = %config.robot_port,
            gripper = %config.gripper_port,
            baud = config.baud_rate,
            "serial links open"
        );
        Ok(SerialTransport {
            robot_reader,
            robot_writer,
            gripper,
        })
    }
}

/// Reads from the arm until it says anything that is not whitespace.
///
/// `reader` is expected to return `Ok(0)` after a short slice without data, so the
/// timeout gets rechecked regularly.
fn wait_for_reply<R: Read>(reader: &mut R, timeout: Duration) -> Result<Duration> {
    let start = Instant::now();
    let mut buf = [0u8; 256];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => 0,
            Err(e) => return Err(e.into()),
        };
        if buf[..n].iter().any(|b| !b.is_ascii_whitespace()) {
            debug!(reply = %String::from_utf8_lossy(&buf[..n]).trim(), "robot replied");
            return Ok(start.elapsed());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(Error::TransportTimeout {
                channel: Channel::Robot,
                waited,
            });
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, channel: Channel, command: &str) -> Result<()> {
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        let writer = match channel {
            Channel::Robot => {
                // A late reply to an earlier command must not acknowledge this one.
                self.robot_reader.discard_pending()?;
                &mut self.robot_writer
            }
            Channel::Gripper => &mut self.gripper,
        };
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    fn await_acknowledgement(&mut self, channel: Channel, timeout: Duration) -> Result<Duration> {
        match channel {
            Channel::Robot => wait_for_reply(&mut self.robot_reader, timeout),
            // The gripper board never answers.
            Channel::Gripper => {
                thread::sleep(timeout);
                Ok(timeout)
            }
        }
    }
}

/// Logs commands instead of sending them. Every acknowledgement arrives instantly.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: Vec<(Channel, String)>,
    paused: Duration,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command sent so far, in order.
    pub fn sent(&self) -> &[(Channel, String)] {
        &self.sent
    }

    /// Total settle time that would have been spent.
    pub fn paused(&self) -> Duration {
        self.paused
    }
}

impl Transport for DryRunTransport {
    fn send(&mut self, channel: Channel, command: &str) -> Result<()> {
        info!(%channel, "{command}");
        self.sent.push((channel, command.to_owned()));
        Ok(())
    }

    fn await_acknowledgement(&mut self, _channel: Channel, _timeout: Duration) -> Result<Duration> {
        Ok(Duration::ZERO)
    }

    fn pause(&mut self, duration: Duration) {
        debug!("pause {:.1}s", duration.as_secs_f64());
        self.paused += duration;
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io};

    use super::*;

    #[test]
    fn dry_run_records_in_order_without_sleeping() {
        let mut transport: Box<dyn Transport> = Box::new(DryRunTransport::new());
        transport.send(Channel::Gripper, "SV0P35").unwrap();
        transport.send(Channel::Robot, "MJX0.000").unwrap();
        let start = Instant::now();
        transport.pause(Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(
            transport
                .await_acknowledgement(Channel::Robot, Duration::from_secs(20))
                .unwrap(),
            Duration::ZERO
        );
    }

    #[test]
    fn dry_run_totals_pauses() {
        let mut transport = DryRunTransport::new();
        transport.pause(Duration::from_millis(600));
        transport.pause(Duration::from_millis(600));
        assert_eq!(transport.paused(), Duration::from_millis(1200));
        transport.send(Channel::Robot, "a").unwrap();
        assert_eq!(transport.sent(), &[(Channel::Robot, "a".to_owned())]);
    }

    /// Hands out one canned chunk per read, then behaves like an idle tty.
    struct Replies(VecDeque<io::Result<&'static [u8]>>);

    impl Read for Replies {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    let chunk = chunk?;
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => {
                    thread::sleep(Duration::from_millis(2));
                    Ok(0)
                }
            }
        }
    }

    fn replies(chunks: &[&'static str]) -> Replies {
        Replies(chunks.iter().map(|c| Ok(c.as_bytes())).collect())
    }

    #[test]
    fn any_visible_reply_acknowledges() {
        let mut arm = replies(&["", "OK\n"]);
        assert!(wait_for_reply(&mut arm, Duration::from_secs(5)).is_ok());

        let mut arm = replies(&["\r\n", "  ", "1"]);
        assert!(wait_for_reply(&mut arm, Duration::from_secs(5)).is_ok());
        assert!(arm.0.is_empty());
    }

    #[test]
    fn whitespace_only_reply_times_out() {
        let mut arm = replies(&["  \n", "\r\n"]);
        let timeout = Duration::from_millis(30);
        match wait_for_reply(&mut arm, timeout) {
            Err(Error::TransportTimeout { channel, waited }) => {
                assert_eq!(channel, Channel::Robot);
                assert!(waited >= timeout);
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn read_errors_abort_the_wait() {
        let mut arm = Replies(VecDeque::from([
            Err(io::Error::from(ErrorKind::Interrupted)),
            Err(io::Error::from(ErrorKind::BrokenPipe)),
        ]));
        assert!(matches!(
            wait_for_reply(&mut arm, Duration::from_secs(5)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::BrokenPipe
        ));
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::Robot.to_string(), "robot");
        assert_eq!(Channel::Gripper.to_string(), "gripper");
    }
}
