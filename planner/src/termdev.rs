use nix::fcntl::{open, OFlag};
use nix::sys::termios::{
    cfsetispeed, cfsetospeed, tcdrain, tcflush, tcgetattr, tcsetattr, BaudRate, ControlFlags,
    FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios,
};

use nix::unistd::{close, read, write};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A tty opened in raw mode, e.g. a USB serial adapter.
pub struct SerialPort {
    fd: i32,
    termios: Termios,
    _drop_handler: Arc<PortCloser>,
}

/// Closes the file descriptor once both halves of a split port are gone.
struct PortCloser {
    fd: i32,
}

pub struct PortReader {
    fd: i32,
    _drop_handler: Arc<PortCloser>,
}

pub struct PortWriter {
    fd: i32,
    _drop_handler: Arc<PortCloser>,
}

fn baud_rate(baud: u32) -> io::Result<BaudRate> {
    Ok(match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {baud}"),
            ))
        }
    })
}

impl SerialPort {
    pub fn open<P: Into<PathBuf>>(filepath: P) -> io::Result<SerialPort> {
        let oflag = OFlag::O_RDWR | OFlag::O_NOCTTY;
        let path: PathBuf = filepath.into();
        let fd = open(&path, oflag, nix::sys::stat::Mode::empty())?;
        let _drop_handler = Arc::new(PortCloser { fd });
        let termios = tcgetattr(fd)?;
        Ok(SerialPort {
            fd,
            termios,
            _drop_handler,
        })
    }

    /// Raw 8N1 at `baud`. Reads return whatever arrived within `read_timeout`,
    /// possibly nothing.
    pub fn configure(&mut self, baud: u32, read_timeout: Duration) -> io::Result<()> {
        let baud = baud_rate(baud)?;
        cfsetispeed(&mut self.termios, baud)?;
        cfsetospeed(&mut self.termios, baud)?;
        self.termios.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
        self.termios.control_flags &= !(ControlFlags::PARENB | ControlFlags::CSTOPB);
        self.termios.output_flags &=
            !(OutputFlags::OPOST | OutputFlags::ONLCR | OutputFlags::OCRNL);
        self.termios.local_flags &= !(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);
        self.termios.input_flags |= InputFlags::IGNCR;
        self.termios.input_flags &=
            !(InputFlags::INPCK | InputFlags::ISTRIP | InputFlags::IXON | InputFlags::ICRNL);

        // VTIME counts tenths of a second and fits in a byte.
        let deciseconds = (read_timeout.as_millis() / 100).clamp(1, 255) as u8;
        self.termios.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        self.termios.control_chars[SpecialCharacterIndices::VTIME as usize] = deciseconds;
        tcsetattr(self.fd, SetArg::TCSAFLUSH, &self.termios)?;
        Ok(())
    }

    /// Splits the port into a read and a write part.
    pub fn split(self) -> (PortReader, PortWriter) {
        (
            PortReader {
                fd: self.fd,
                _drop_handler: self._drop_handler.clone(),
            },
            PortWriter {
                fd: self.fd,
                _drop_handler: self._drop_handler,
            },
        )
    }
}

impl PortReader {
    /// Throws away anything received but not yet read.
    pub fn discard_pending(&mut self) -> io::Result<()> {
        tcflush(self.fd, FlushArg::TCIFLUSH)?;
        Ok(())
    }
}

impl io::Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read(self.fd, buf)?)
    }
}

impl io::Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(write(self.fd, buf)?)
    }

    /// Blocks until everything written has been transmitted.
    fn flush(&mut self) -> io::Result<()> {
        tcdrain(self.fd)?;
        Ok(())
    }
}

impl std::ops::Drop for PortCloser {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}
