//! Protocol command parsing.

/// How the `position` command sets up the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionSetup {
    /// `position startpos ...`
    Start,
    /// `position fen <fen> ...`, carried as text so the shell can keep the
    /// old position when the FEN turns out to be invalid.
    Fen(String),
}

/// Clock fields of a `go` command, in milliseconds. Missing fields stay at
/// -1, which the think-time heuristic treats as "no usable clock".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoClocks {
    pub wtime: i64,
    pub btime: i64,
    pub winc: i64,
    pub binc: i64,
}

impl Default for GoClocks {
    fn default() -> GoClocks {
        GoClocks {
            wtime: -1,
            btime: -1,
            winc: -1,
            binc: -1,
        }
    }
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `init`: respond `ready`.
    Init,
    /// `ready`: respond `readyok`.
    Ready,
    /// `newgame`: reset history and position.
    NewGame,
    /// `position ...` with the moves to apply afterwards.
    Position {
        /// Starting point of the setup.
        setup: PositionSetup,
        /// Move strings to apply in order.
        moves: Vec<String>,
    },
    /// `go wtime W btime B winc Wi binc Bi`.
    Go(GoClocks),
    /// `stop`: halt the search, publish best-so-far.
    Stop,
    /// `quit`: stop and exit.
    Quit,
    /// `d`: print the board diagram.
    Diagram,
    /// Anything else; silently ignored.
    Unknown(String),
}

/// Parse one line of input. Command words are case-insensitive; unknown
/// lines become [`Command::Unknown`] rather than errors.
pub fn parse_command(line: &str) -> Command {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(head) = tokens.first() else {
        return Command::Unknown(String::new());
    };

    match head.to_ascii_lowercase().as_str() {
        "init" => Command::Init,
        "ready" => Command::Ready,
        "newgame" => Command::NewGame,
        "stop" => Command::Stop,
        "quit" => Command::Quit,
        "d" => Command::Diagram,
        "position" => parse_position(&tokens[1..]),
        "go" => Command::Go(parse_go(&tokens[1..])),
        other => Command::Unknown(other.to_string()),
    }
}

fn parse_position(tokens: &[&str]) -> Command {
    let moves_at = tokens.iter().position(|&t| t == "moves");
    let (setup_tokens, move_tokens) = match moves_at {
        Some(i) => (&tokens[..i], &tokens[i + 1..]),
        None => (tokens, &[][..]),
    };

    let setup = match setup_tokens.first() {
        Some(&"startpos") => PositionSetup::Start,
        Some(&"fen") => PositionSetup::Fen(setup_tokens[1..].join(" ")),
        _ => return Command::Unknown("position".to_string()),
    };

    // Incoming move strings may carry '=' before the promotion letter.
    let moves = move_tokens
        .iter()
        .map(|m| m.replace('=', "").to_ascii_lowercase())
        .collect();

    Command::Position { setup, moves }
}

fn parse_go(tokens: &[&str]) -> GoClocks {
    let mut clocks = GoClocks::default();
    let mut i = 0;
    while i + 1 < tokens.len() {
        let value: Option<i64> = tokens[i + 1].parse().ok();
        match (tokens[i], value) {
            ("wtime", Some(v)) => clocks.wtime = v,
            ("btime", Some(v)) => clocks.btime = v,
            ("winc", Some(v)) => clocks.winc = v,
            ("binc", Some(v)) => clocks.binc = v,
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    clocks
}
