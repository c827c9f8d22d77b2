use std::io::{BufRead, Write};

use anyhow::Context;

use crate::{
    arm::Transport,
    error::Error,
    moves::{Choreographer, MoveKind, MoveRequest},
};

/// A line typed at the prompt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Input {
    Quit,
    Move(MoveRequest),
}

/// `q` quits, `e2e4` is a plain move, `x d4e5` a capture and `c e1g1` a castle.
pub fn parse_input(line: &str) -> Result<Input, Error> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return Ok(Input::Quit);
    }
    let (kind, notation) = match line.split_once(char::is_whitespace) {
        Some((p, rest)) if p.eq_ignore_ascii_case("x") => (MoveKind::Capture, rest),
        Some((p, rest)) if p.eq_ignore_ascii_case("c") => (MoveKind::Castle, rest),
        _ => (MoveKind::Normal, line),
    };
    let request: MoveRequest = notation.parse()?;
    Ok(Input::Move(request.with_kind(kind)))
}

/// Reads moves from `input` until `q` or end of input and plays them.
///
/// Bad input is reported and the prompt comes back. Serial failures end the session.
pub fn run<T: Transport>(
    choreographer: &mut Choreographer<T>,
    input: impl BufRead,
    mut out: impl Write,
) -> anyhow::Result<()> {
    writeln!(out, "=== chess arm ===")?;
    writeln!(out, "enter a move (e2e4, x d4e5 to capture, c e1g1 to castle), q to quit")?;

    let mut lines = input.lines();
    loop {
        write!(out, "move> ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        match parse_input(&line?) {
            Ok(Input::Quit) => {
                writeln!(out, "bye")?;
                break;
            }
            Ok(Input::Move(request)) => match choreographer.execute(request) {
                Ok(()) => {}
                Err(e @ (Error::InvalidSquare(_) | Error::Encoding(_))) => {
                    writeln!(out, "move aborted: {e}")?
                }
                Err(e) => return Err(e).with_context(|| format!("playing {request}")),
            },
            Err(Error::MalformedMoveInput(_)) => writeln!(out, "format error, example: e2e4")?,
            Err(e) => writeln!(out, "{e}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arm::DryRunTransport, chess::Square, config::Config};

    fn session(input: &str) -> (Choreographer<DryRunTransport>, String) {
        let mut choreographer = Choreographer::new(DryRunTransport::new(), &Config::default());
        let mut out = Vec::new();
        run(&mut choreographer, input.as_bytes(), &mut out).unwrap();
        (choreographer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_prefixed_moves() {
        let Input::Move(mv) = parse_input("x d4e5").unwrap() else {
            panic!("expected a move");
        };
        assert_eq!((mv.to_string(), mv.kind), ("d4e5".to_owned(), MoveKind::Capture));

        let Input::Move(mv) = parse_input("c e1g1").unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(mv.kind, MoveKind::Castle);

        let Input::Move(mv) = parse_input("X D4E5").unwrap() else {
            panic!("expected a move");
        };
        assert_eq!((mv.to_string(), mv.kind), ("d4e5".to_owned(), MoveKind::Capture));

        let Input::Move(mv) = parse_input("C e8c8").unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(mv.kind, MoveKind::Castle);

        assert_eq!(parse_input("Q").unwrap(), Input::Quit);
        assert!(matches!(parse_input("x e4"), Err(Error::MalformedMoveInput(_))));
    }

    #[test]
    fn quit_stops_reading() {
        let (choreographer, out) = session("e2e4\nq\ne7e5\n");
        assert_eq!(choreographer.last_end(), Some(Square::new(4, 3)));
        assert_eq!(choreographer.transport().sent().len(), 12);
        assert!(out.ends_with("bye\n"));
    }

    #[test]
    fn bad_lines_reprompt() {
        let (choreographer, out) = session("hello\n\ne2e9\ne2e4\n");
        assert_eq!(out.matches("format error, example: e2e4").count(), 2);
        assert!(out.contains("invalid square"));
        assert_eq!(out.matches("move> ").count(), 5);
        assert_eq!(choreographer.last_end(), Some(Square::new(4, 3)));
    }
}
