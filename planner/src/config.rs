//! Rig configuration, read once at startup from a TOML file.
//!
//! Every section is optional; anything left out falls back to the values the
//! rig was calibrated with.

use std::{fs, path::Path, time::Duration};

use chessarm::{Orientation, RobotPose};
use serde::Deserialize;

use crate::{board::CalibrationCorners, error::Error};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub serial: SerialConfig,
    pub corners: CalibrationCorners,
    pub poses: NamedPoses,
    pub timing: Timing,
    pub speeds: Speeds,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.corners.is_degenerate() {
            return Err(Error::Config(
                "calibration corners are collinear, cannot interpolate".to_owned(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be positive".to_owned()));
        }
        let t = &self.timing;
        for (name, secs) in [
            ("robot_ack_timeout", t.robot_ack_timeout),
            ("gripper_delay", t.gripper_delay),
            ("grip_settle", t.grip_settle),
            ("grip_hold", t.grip_hold),
            ("castle_settle", t.castle_settle),
            ("drop_settle", t.drop_settle),
        ] {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("timing.{name} = {secs}: {e}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub robot_port: String,
    pub gripper_port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            robot_port: "/dev/ttyUSB0".to_owned(),
            gripper_port: "/dev/ttyUSB1".to_owned(),
            baud_rate: 9600,
        }
    }
}

const PARKED: Orientation = Orientation {
    rz: 0.018,
    ry: 180.0,
    rx: 0.016,
};

/// The fixed poses the arm travels through between board moves.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamedPoses {
    /// Waypoint used to clear the pieces on long moves.
    pub temp: RobotPose,
    /// Where the arm rests between moves.
    pub home: RobotPose,
    /// Above the box captured pieces are dropped into.
    #[serde(rename = "box")]
    pub bin: RobotPose,
}

impl Default for NamedPoses {
    fn default() -> Self {
        NamedPoses {
            temp: RobotPose::new(286.878, 200.064, 433.7, 40).with_orientation(PARKED),
            home: RobotPose::new(286.878, 0.064, 433.7, 40).with_orientation(PARKED),
            bin: RobotPose::new(331.169, -178.241, 240.0, 40).with_orientation(Orientation {
                rz: 0.077,
                ry: 180.0,
                rx: 0.069,
            }),
        }
    }
}

/// Acknowledgement timeouts and settle pauses, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    /// Upper bound on waiting for the arm to report a finished motion.
    pub robot_ack_timeout: f64,
    /// The gripper never answers, this long is assumed to be enough.
    pub gripper_delay: f64,
    /// Before closing on a piece during a normal move or a capture.
    pub grip_settle: f64,
    /// After closing on a piece during a normal move or a capture.
    pub grip_hold: f64,
    /// Before and after closing on a piece while castling.
    pub castle_settle: f64,
    /// Above the box, before letting go of a captured piece.
    pub drop_settle: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            robot_ack_timeout: 20.0,
            gripper_delay: 0.3,
            grip_settle: 1.0,
            grip_hold: 3.0,
            castle_settle: 0.6,
            drop_settle: 1.0,
        }
    }
}

impl Timing {
    pub fn robot_ack_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.robot_ack_timeout)
    }

    pub fn gripper_delay(&self) -> Duration {
        Duration::from_secs_f64(self.gripper_delay)
    }

    pub fn grip_settle(&self) -> Duration {
        Duration::from_secs_f64(self.grip_settle)
    }

    pub fn grip_hold(&self) -> Duration {
        Duration::from_secs_f64(self.grip_hold)
    }

    pub fn castle_settle(&self) -> Duration {
        Duration::from_secs_f64(self.castle_settle)
    }

    pub fn drop_settle(&self) -> Duration {
        Duration::from_secs_f64(self.drop_settle)
    }
}

/// Arm speeds for the different legs of a move.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Speeds {
    /// Travel above the board to a square.
    pub approach: u32,
    /// Travel above the board to a piece about to be captured.
    pub capture_approach: u32,
    /// Down onto a piece to pick it up.
    pub pick_descent: u32,
    /// Down onto the target square of a normal move.
    pub place_descent: u32,
    /// Down onto a square while castling or capturing.
    pub careful_descent: u32,
    /// Back up to travel height.
    pub lift: u32,
    /// Travel height above the board, in millimetres.
    pub safe_height: f64,
}

impl Default for Speeds {
    fn default() -> Self {
        Speeds {
            approach: 45,
            capture_approach: 30,
            pick_descent: 10,
            place_descent: 5,
            careful_descent: 8,
            lift: 20,
            safe_height: 240.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_gives_the_calibrated_rig() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.corners, CalibrationCorners::default());
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.poses.home.y, 0.064);
        assert_eq!(config.poses.bin.orientation.rx, 0.069);
    }

    #[test]
    fn overrides_sections_independently() {
        let config = Config::parse(
            r#"
            [serial]
            robot_port = "/dev/ttyACM0"

            [corners]
            a1 = [510.0, -90.0]
            h1 = [510.0, 90.0]
            a8 = [310.0, -90.0]
            h8 = [310.0, 90.0]

            [poses.box]
            x = 330.0
            y = -180.0
            z = 250.0
            speed = 35
            orientation = { rz = 0.0, ry = 180.0, rx = 0.0 }

            [timing]
            robot_ack_timeout = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.robot_port, "/dev/ttyACM0");
        assert_eq!(config.serial.gripper_port, "/dev/ttyUSB1");
        assert_eq!(config.corners.a1.x, 510.0);
        assert_eq!(config.poses.bin.speed, 35);
        assert_eq!(config.poses.temp, NamedPoses::default().temp);
        assert_eq!(config.timing.robot_ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.timing.gripper_delay(), Duration::from_millis(300));
    }

    #[test]
    fn rejects_collinear_corners() {
        let err = Config::parse(
            r#"
            [corners]
            a1 = [0.0, 0.0]
            h1 = [0.0, 1.0]
            a8 = [0.0, 2.0]
            h8 = [0.0, 3.0]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_durations_that_do_not_fit() {
        for bad in ["1e20", "-0.5", "nan", "inf"] {
            let toml = format!("[timing]\nrobot_ack_timeout = {bad}\n");
            let err = Config::parse(&toml).unwrap_err();
            assert!(matches!(err, Error::Config(msg) if msg.contains("robot_ack_timeout")));
        }
        let config = Config::parse("[timing]\ncastle_settle = 0.0\n").unwrap();
        assert_eq!(config.timing.castle_settle(), Duration::ZERO);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::parse("[timing]\nrobot_timeout = 3.0\n").is_err());
        let corners = r#"
            [corners]
            a1 = [500.0, -95.0]
            h1 = [500.0, 95.0]
            a8 = [300.0, -85.0]
            h8 = [295.0, 105.0]
            "#;
        assert!(Config::parse(corners).is_ok());
        let stray = format!("{corners}a0 = [510.0, -95.0]\n");
        assert!(matches!(Config::parse(&stray), Err(Error::Config(_))));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[speeds]\napproach = 60").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.speeds.approach, 60);
        assert_eq!(config.speeds.lift, 20);

        assert!(matches!(
            Config::load(file.path().with_extension("missing")),
            Err(Error::Config(_))
        ));
    }
}
