//! Chat command parsing. Every recognized command is consumed by the proxy;
//! the dispatcher in the orchestrator carries out the effects.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewDistanceArg {
    Chunks(u32),
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Link,
    Unlink,
    View,
    Unview,
    Tp,
    /// `c <text>` relays text to every connected observer.
    Broadcast(String),
    ViewDistance(ViewDistanceArg),
    ReloadChunks,
    Help,
}

const DEFAULT_VIEW_DISTANCE: u32 = 20;

/// Parses a chat line. `None` when the line does not carry the command
/// prefix; unknown commands parse as `Help`.
pub fn parse(prefix: &str, message: &str) -> Option<Command> {
    let trimmed = message.trim();
    let body = trimmed.strip_prefix(prefix)?;

    let mut words = body.split_whitespace();
    let command = match words.next() {
        Some(word) => word,
        None => return Some(Command::Help),
    };

    // Case-sensitive, like the rest of the protocol's text surface.
    let parsed = match command {
        "link" => Command::Link,
        "unlink" => Command::Unlink,
        "view" => Command::View,
        "unview" => Command::Unview,
        "tp" => Command::Tp,
        "c" => {
            let rest: Vec<&str> = words.collect();
            Command::Broadcast(rest.join(" "))
        }
        "viewdistance" => match words.next() {
            Some("disable") => Command::ViewDistance(ViewDistanceArg::Disable),
            Some(value) => Command::ViewDistance(ViewDistanceArg::Chunks(
                value.parse().unwrap_or(DEFAULT_VIEW_DISTANCE),
            )),
            None => Command::ViewDistance(ViewDistanceArg::Chunks(DEFAULT_VIEW_DISTANCE)),
        },
        "reloadchunks" => Command::ReloadChunks,
        _ => Command::Help,
    };
    Some(parsed)
}

pub fn help_lines(prefix: &str) -> Vec<String> {
    vec![
        "Available commands:".to_string(),
        format!("{prefix}c [Message]    Send a message to all other connected clients"),
        format!("{prefix}link    Links to the proxy if no one else is linked"),
        format!("{prefix}unlink    Unlink and put into spectator mode"),
        format!("{prefix}view    Connect into the view off the person currently connected"),
        format!("{prefix}unview    Disconnect from the view"),
        format!("{prefix}tp    Tp the spectator to the current proxy"),
        format!("{prefix}help    This"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_command_chat_is_none() {
        assert_eq!(parse("$", "hello there"), None);
        assert_eq!(parse("$", ""), None);
        assert_eq!(parse("$", "link"), None);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("$", "$link"), Some(Command::Link));
        assert_eq!(parse("$", "$unlink"), Some(Command::Unlink));
        assert_eq!(parse("$", "$view"), Some(Command::View));
        assert_eq!(parse("$", "$unview"), Some(Command::Unview));
        assert_eq!(parse("$", "$tp"), Some(Command::Tp));
        assert_eq!(parse("$", "$reloadchunks"), Some(Command::ReloadChunks));
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        assert_eq!(parse("$", "$LINK"), Some(Command::Help));
        assert_eq!(parse("$", "$Link"), Some(Command::Help));
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert_eq!(parse("$", "  $link  "), Some(Command::Link));
    }

    #[test]
    fn test_broadcast_keeps_text() {
        assert_eq!(
            parse("$", "$c hello"),
            Some(Command::Broadcast("hello".to_string()))
        );
        assert_eq!(
            parse("$", "$c one two three"),
            Some(Command::Broadcast("one two three".to_string()))
        );
        assert_eq!(parse("$", "$c"), Some(Command::Broadcast(String::new())));
    }

    #[test]
    fn test_view_distance_arguments() {
        assert_eq!(
            parse("$", "$viewdistance 8"),
            Some(Command::ViewDistance(ViewDistanceArg::Chunks(8)))
        );
        assert_eq!(
            parse("$", "$viewdistance disable"),
            Some(Command::ViewDistance(ViewDistanceArg::Disable))
        );
        // Missing or unparsable numbers fall back to the default.
        assert_eq!(
            parse("$", "$viewdistance"),
            Some(Command::ViewDistance(ViewDistanceArg::Chunks(
                DEFAULT_VIEW_DISTANCE
            )))
        );
        assert_eq!(
            parse("$", "$viewdistance lots"),
            Some(Command::ViewDistance(ViewDistanceArg::Chunks(
                DEFAULT_VIEW_DISTANCE
            )))
        );
    }

    #[test]
    fn test_unknown_commands_fall_back_to_help() {
        assert_eq!(parse("$", "$bogus"), Some(Command::Help));
        assert_eq!(parse("$", "$help"), Some(Command::Help));
        assert_eq!(parse("$", "$"), Some(Command::Help));
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(parse("!", "!link"), Some(Command::Link));
        assert_eq!(parse("!", "$link"), None);
    }

    #[test]
    fn test_help_lines_mention_every_command() {
        let help = help_lines("$");
        let joined = help.join("\n");
        for name in ["$c", "$link", "$unlink", "$view", "$unview", "$tp", "$help"] {
            assert!(joined.contains(name), "help is missing {}", name);
        }
    }
}
