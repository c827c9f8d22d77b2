//! Text protocol spoken by the arm controller and the gripper board.
//!
//! Both links are line based: the host writes one command per line and the
//! arm answers with an arbitrary non-empty line once the motion is done. The
//! gripper never answers.

use std::fmt;

use thiserror::Error;

/// Joint hints sent with every motion command.
pub const JOINT_HINTS: [f64; 3] = [70.0, 80.0, 90.0];
pub const ACCELERATION: u32 = 15;
pub const DECELERATION: u32 = 15;
pub const MOTION_MODE: u32 = 80;
const TRAILER: &str = "WFLm000000";

/// Tool orientation in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Orientation {
    pub rz: f64,
    pub ry: f64,
    pub rx: f64,
}

impl Orientation {
    /// Orientation used for every move computed over the board.
    pub const BOARD: Orientation = Orientation {
        rz: 0.024,
        ry: 174.670,
        rx: 0.016,
    };
}

/// An absolute cartesian target for the arm, coordinates in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub speed: u32,
    pub orientation: Orientation,
}

impl RobotPose {
    pub const fn new(x: f64, y: f64, z: f64, speed: u32) -> Self {
        RobotPose {
            x,
            y,
            z,
            speed,
            orientation: Orientation::BOARD,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    fn check_finite(&self) -> Result<(), EncodeError> {
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("rz", self.orientation.rz),
            ("ry", self.orientation.ry),
            ("rx", self.orientation.rx),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EncodeError::NonFinite { field: name, value });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GripperState {
    Open,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Move(RobotPose),
    Gripper(GripperState),
}

#[derive(Error, Clone, Copy, Debug, PartialEq)]
pub enum EncodeError {
    #[error("pose field {field} is not finite ({value})")]
    NonFinite { field: &'static str, value: f64 },
}

impl Command {
    /// Renders the command as it goes on the wire, without the line terminator.
    pub fn encode(&self) -> Result<String, EncodeError> {
        if let Command::Move(pose) = self {
            pose.check_finite()?;
        }
        Ok(self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move(pose) => {
                let Orientation { rz, ry, rx } = pose.orientation;
                let [j1, j2, j3] = JOINT_HINTS;
                write!(
                    f,
                    "MJX{:.3}Y{:.3}Z{:.3}Rz{rz:.3}Ry{ry:.3}Rx{rx:.3}",
                    pose.x, pose.y, pose.z
                )?;
                write!(f, "J{j1:.2}J{j2:.2}J{j3:.2}")?;
                write!(
                    f,
                    "Sp{}Ac{ACCELERATION}Dc{DECELERATION}Rm{MOTION_MODE}{TRAILER}",
                    pose.speed
                )
            }
            Command::Gripper(GripperState::Open) => write!(f, "SV0P35"),
            Command::Gripper(GripperState::Close) => write!(f, "SV0P0"),
        }
    }
}
