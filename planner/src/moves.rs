use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use chessarm::{Command, GripperState, RobotPose};
use tracing::{debug, info, warn};

use crate::{
    arm::{Channel, Transport},
    board::{rook_descent_height, Board, PhysicalPosition},
    chess::Square,
    config::{Config, NamedPoses, Speeds, Timing},
    error::{Error, Result},
};

/// How the pieces involved in a move have to be handled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MoveKind {
    Normal,
    /// The piece on the target square goes into the box first.
    Capture,
    /// King move; the rook follows.
    Castle,
}

/// A move as typed by the operator. Legality is the caller's business.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MoveRequest {
    pub start: Square,
    pub end: Square,
    pub kind: MoveKind,
}

impl MoveRequest {
    pub fn new(start: Square, end: Square, is_capture: bool, is_castle: bool) -> Result<Self> {
        let kind = match (is_capture, is_castle) {
            (false, false) => MoveKind::Normal,
            (true, false) => MoveKind::Capture,
            (false, true) => MoveKind::Castle,
            (true, true) => return Err(Error::ConflictingMoveFlags),
        };
        Ok(MoveRequest { start, end, kind })
    }

    pub fn with_kind(self, kind: MoveKind) -> Self {
        MoveRequest { kind, ..self }
    }
}

impl FromStr for MoveRequest {
    type Err = Error;

    /// Parses `<file><rank><file><rank>`, e.g. `e2e4`, as a normal move.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.chars().count() != 4 || !s.is_ascii() {
            return Err(Error::MalformedMoveInput(s.to_owned()));
        }
        let start = s[..2].parse()?;
        let end = s[2..].parse()?;
        Ok(MoveRequest {
            start,
            end,
            kind: MoveKind::Normal,
        })
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.start, self.end)
    }
}

/// One atomic action of the rig.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    MoveRobot { pose: RobotPose, note: String },
    Gripper(GripperState),
    Sleep(Duration),
}

/// Whether a carried piece has to go via the temp waypoint to stay clear of
/// the other pieces.
pub fn needs_temp(start: Square, end: Square) -> bool {
    let central = |sq: Square| matches!(sq.file_char(), 'd' | 'e');
    if central(start) && central(end) {
        return false;
    }
    let same_file = start.file == end.file;
    let rank_distance = start.rank.abs_diff(end.rank);
    !(same_file && rank_distance < 3)
}

/// The rook move that goes with a castling king move.
///
/// Decided by the direction the king travels: towards the h-file the rook goes
/// h to f, otherwise a to d, on the king's starting rank.
pub fn castle_rook_move(king_start: Square, king_end: Square) -> (Square, Square) {
    if king_end.file > king_start.file {
        (king_start.with_file(7), king_start.with_file(5))
    } else {
        (king_start.with_file(0), king_start.with_file(3))
    }
}

/// A square together with where it is and how far down the claw goes there.
#[derive(Clone, Copy, Debug)]
struct Spot {
    square: Square,
    position: PhysicalPosition,
    descent: f64,
}

impl Spot {
    fn new(board: &Board, square: Square) -> Result<Self> {
        let position = board.square_to_position(square)?;
        Ok(Spot {
            square,
            position,
            descent: position.descent_height(),
        })
    }

    fn at(&self, z: f64, speed: u32) -> RobotPose {
        RobotPose::new(self.position.x, self.position.y, z, speed)
    }
}

/// Turns moves into arm and gripper commands and runs them one at a time.
pub struct Choreographer<T> {
    transport: T,
    board: Board,
    poses: NamedPoses,
    timing: Timing,
    speeds: Speeds,
    last_end: Option<Square>,
}

impl<T: Transport> Choreographer<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Choreographer {
            transport,
            board: Board::new(config.corners),
            poses: config.poses,
            timing: config.timing,
            speeds: config.speeds,
            last_end: None,
        }
    }

    /// The square the last completed move put a piece on.
    pub fn last_end(&self) -> Option<Square> {
        self.last_end
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Physically plays `request`. Acknowledgement timeouts are logged and
    /// ignored. Nothing is undone if a later step fails.
    pub fn execute(&mut self, request: MoveRequest) -> Result<()> {
        let MoveRequest { start, end, kind } = request;

        // Resolve every square up front so a bad one fails before the arm moves.
        let from = Spot::new(&self.board, start)?;
        let to = Spot::new(&self.board, end)?;
        let rook = match kind {
            MoveKind::Castle => {
                let (rook_start, rook_end) = castle_rook_move(start, end);
                let mut rook_from = Spot::new(&self.board, rook_start)?;
                let mut rook_to = Spot::new(&self.board, rook_end)?;
                let descent = rook_descent_height(rook_from.position.rank);
                rook_from.descent = descent;
                rook_to.descent = descent;
                Some((rook_from, rook_to))
            }
            _ => None,
        };

        info!("=== {start} -> {end} ({kind:?}) ===");
        let started = Instant::now();

        self.gripper(GripperState::Open)?;
        self.go_temp()?;

        if kind == MoveKind::Capture {
            self.dispose_of(to)?;
        }

        if let Some((rook_from, rook_to)) = rook {
            info!("castling: king first");
            self.relocate(from, to, "king")?;
            info!("castling: now the rook");
            self.relocate(rook_from, rook_to, "rook")?;
            self.go_home()?;
            self.gripper(GripperState::Close)?;
        } else {
            self.carry(from, to)?;
        }

        self.last_end = Some(end);
        info!(
            "=== {start} -> {end} done in {:.2}s ===",
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Takes the piece standing on `spot` off the board and drops it in the box.
    fn dispose_of(&mut self, spot: Spot) -> Result<()> {
        let Speeds {
            safe_height,
            capture_approach,
            careful_descent,
            lift,
            ..
        } = self.speeds;
        let sq = spot.square;
        info!("capture: taking the piece on {sq}");
        self.move_robot(spot.at(safe_height, capture_approach), format!("above {sq}"))?;
        self.move_robot(
            spot.at(spot.descent, careful_descent),
            format!("down to {sq} (z={})", spot.descent),
        )?;
        self.pause(self.timing.grip_settle())?;
        self.gripper(GripperState::Close)?;
        self.pause(self.timing.grip_hold())?;
        self.move_robot(spot.at(safe_height, lift), format!("up from {sq}"))?;
        self.go_box()?;
        self.pause(self.timing.drop_settle())?;
        self.gripper(GripperState::Open)?;
        self.go_temp()?;
        info!("capture: piece from {sq} is in the box");
        Ok(())
    }

    /// Full pick and place of one piece while castling, always via temp.
    fn relocate(&mut self, from: Spot, to: Spot, piece: &str) -> Result<()> {
        let Speeds {
            safe_height,
            approach,
            pick_descent,
            careful_descent,
            lift,
            ..
        } = self.speeds;
        let settle = self.timing.castle_settle();
        let (src, dst) = (from.square, to.square);

        self.gripper(GripperState::Open)?;
        self.go_temp()?;
        self.move_robot(from.at(safe_height, approach), format!("above {src} ({piece})"))?;
        self.move_robot(from.at(from.descent, pick_descent), format!("down to {src} ({piece})"))?;
        self.pause(settle)?;
        self.gripper(GripperState::Close)?;
        self.pause(settle)?;
        self.move_robot(from.at(safe_height, lift), format!("up from {src} ({piece})"))?;
        self.go_temp()?;
        self.move_robot(to.at(safe_height, approach), format!("above {dst} ({piece})"))?;
        self.move_robot(to.at(to.descent, careful_descent), format!("down to {dst} ({piece})"))?;
        self.gripper(GripperState::Open)?;
        self.move_robot(to.at(safe_height, lift), format!("up from {dst} ({piece})"))?;
        self.go_temp()
    }

    /// Picks up the piece on `from`, sets it down on `to` and parks the arm.
    fn carry(&mut self, from: Spot, to: Spot) -> Result<()> {
        let Speeds {
            safe_height,
            approach,
            pick_descent,
            place_descent,
            lift,
            ..
        } = self.speeds;
        let (src, dst) = (from.square, to.square);

        self.move_robot(from.at(safe_height, approach), format!("above {src}"))?;
        self.move_robot(
            from.at(from.descent, pick_descent),
            format!("down to {src} (z={})", from.descent),
        )?;
        self.pause(self.timing.grip_settle())?;
        self.gripper(GripperState::Close)?;
        self.pause(self.timing.grip_hold())?;
        self.move_robot(from.at(safe_height, lift), format!("up from {src}"))?;

        if needs_temp(src, dst) {
            self.go_temp()?;
        } else {
            info!("skipping temp, short move from the {} file", src.file_char());
        }

        self.move_robot(to.at(safe_height, approach), format!("above {dst}"))?;
        self.move_robot(
            to.at(to.descent, place_descent),
            format!("down to {dst} (z={})", to.descent),
        )?;
        self.gripper(GripperState::Open)?;
        self.move_robot(to.at(safe_height, lift), format!("up from {dst}"))?;
        self.go_home()?;
        self.gripper(GripperState::Close)
    }

    fn go_temp(&mut self) -> Result<()> {
        self.move_robot(self.poses.temp, "temp".to_owned())
    }

    fn go_home(&mut self) -> Result<()> {
        self.move_robot(self.poses.home, "home".to_owned())
    }

    fn go_box(&mut self) -> Result<()> {
        self.move_robot(self.poses.bin, "box".to_owned())
    }

    fn move_robot(&mut self, pose: RobotPose, note: String) -> Result<()> {
        self.run(Step::MoveRobot { pose, note })
    }

    fn gripper(&mut self, state: GripperState) -> Result<()> {
        self.run(Step::Gripper(state))
    }

    fn pause(&mut self, duration: Duration) -> Result<()> {
        self.run(Step::Sleep(duration))
    }

    /// Sends one step and waits for it to finish.
    fn run(&mut self, step: Step) -> Result<()> {
        let (channel, command, note, timeout) = match step {
            Step::MoveRobot { pose, note } => (
                Channel::Robot,
                Command::Move(pose),
                note,
                self.timing.robot_ack_timeout(),
            ),
            Step::Gripper(state) => (
                Channel::Gripper,
                Command::Gripper(state),
                format!("gripper {}", if state == GripperState::Open { "open" } else { "close" }),
                self.timing.gripper_delay(),
            ),
            Step::Sleep(duration) => {
                self.transport.pause(duration);
                return Ok(());
            }
        };

        let line = command.encode()?;
        info!("> {note}");
        debug!(%channel, "{line}");
        let started = Instant::now();
        self.transport.send(channel, &line)?;
        match self.transport.await_acknowledgement(channel, timeout) {
            Ok(_) => {}
            Err(err @ Error::TransportTimeout { .. }) => warn!("{err}, carrying on"),
            Err(err) => return Err(err),
        }
        info!("  {note} done ({:.2}s)", started.elapsed().as_secs_f64());
        Ok(())
    }
}
