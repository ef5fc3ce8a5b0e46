//! REPL – the operator console.
//!
//! Supported slash-commands:
//!   /connect [url]        – open the bridge connection
//!   /disconnect           – close it
//!   /endpoint <url>       – change the endpoint (while disconnected)
//!   /w /s /a /d           – drive forward / back / turn left / turn right
//!   /vel <lin> <ang>      – send an explicit twist
//!   /stop                 – emergency stop
//!   /say <topic> <text>   – publish a std_msgs/String command
//!   /publish <topic> <type> <json>
//!   /status               – connection state and telemetry
//!   /help, /quit | /exit

use colored::Colorize;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use teleop_bridge::{Direction, SessionCommand, SessionHandle, SessionView};
use teleop_types::{ConnectionState, Notice, OutboundCommand};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Status,
    Quit,
    Session(SessionCommand),
}

/// Parse one line of input.
pub fn parse(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let session = |c| Ok(ReplCommand::Session(c));
    match cmd {
        "/help" => Ok(ReplCommand::Help),
        "/status" => Ok(ReplCommand::Status),
        "/quit" | "/exit" => Ok(ReplCommand::Quit),
        "/connect" => session(SessionCommand::Connect(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/disconnect" => session(SessionCommand::Disconnect),
        "/endpoint" if !rest.is_empty() => session(SessionCommand::SetEndpoint(rest.to_string())),
        "/endpoint" => Err("usage: /endpoint <ws://host:port>".to_string()),
        "/w" => session(SessionCommand::Drive(Direction::Forward)),
        "/s" => session(SessionCommand::Drive(Direction::Backward)),
        "/a" => session(SessionCommand::Drive(Direction::Left)),
        "/d" => session(SessionCommand::Drive(Direction::Right)),
        "/stop" => session(SessionCommand::EmergencyStop),
        "/vel" => {
            let mut parts = rest.split_whitespace().map(str::parse::<f64>);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(linear)), Some(Ok(angular)), None) => session(SessionCommand::Send(
                    OutboundCommand::Velocity { linear, angular },
                )),
                _ => Err("usage: /vel <linear m/s> <angular rad/s>".to_string()),
            }
        }
        "/say" => match rest.split_once(char::is_whitespace) {
            Some((topic, text)) => session(SessionCommand::Send(OutboundCommand::Text {
                topic: topic.to_string(),
                data: text.trim().to_string(),
            })),
            None => Err("usage: /say <topic> <text>".to_string()),
        },
        "/publish" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(topic), Some(msg_type), Some(json)) if !topic.is_empty() => {
                    let payload: Value = serde_json::from_str(json.trim())
                        .map_err(|e| format!("invalid JSON payload: {e}"))?;
                    session(SessionCommand::Publish {
                        topic: topic.to_string(),
                        msg_type: msg_type.to_string(),
                        payload,
                    })
                }
                _ => Err("usage: /publish <topic> <type> <json>".to_string()),
            }
        }
        other => Err(format!("Unknown command: '{other}'")),
    }
}

/// Entry point for the interactive console.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(handle: SessionHandle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", prompt(&handle.view()));
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(ReplCommand::Help) => print_help(),
            Ok(ReplCommand::Status) => print_status(&handle.view()),
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(ReplCommand::Session(cmd)) => handle.send(cmd),
            Err(msg) => println!(
                "{} Type {} for available commands.",
                msg.red(),
                "/help".bold()
            ),
        }
    }
}

/// Print notices from the session as they arrive.
pub async fn print_notices(handle: SessionHandle) {
    let mut notices = handle.notices();
    loop {
        match notices.recv().await {
            Ok(notice) => println!("\n{}", describe(&notice)),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(notice: &Notice) -> String {
    match notice {
        Notice::EmergencyStopIssued => "⚠  EMERGENCY STOP sent – robot commanded to halt."
            .yellow()
            .bold()
            .to_string(),
        Notice::CommandSent { topic } => format!("  ✓ command sent to {}", topic.bold())
            .green()
            .to_string(),
        Notice::AlreadyConnected => "  already connected – /disconnect first".dimmed().to_string(),
    }
}

fn prompt(view: &SessionView) -> String {
    let marker = match view.state {
        ConnectionState::Connected => "●".green(),
        ConnectionState::Connecting => "●".yellow(),
        ConnectionState::Error => "●".red(),
        ConnectionState::Disconnected => "○".dimmed(),
    };
    format!("{} {}", marker, "teleop>".bold().cyan())
}

fn print_help() {
    println!();
    println!("{}", "Teleop Commands".bold().underline());
    println!("  {}  – open the bridge connection", "/connect [url]".bold().cyan());
    println!("  {}     – close the connection", "/disconnect".bold().cyan());
    println!("  {}  – change endpoint while disconnected", "/endpoint <url>".bold().cyan());
    println!("  {}     – forward / back / left / right", "/w /s /a /d".bold().cyan());
    println!("  {}  – send a velocity command", "/vel <lin> <ang>".bold().cyan());
    println!("  {}            – emergency stop", "/stop".bold().cyan());
    println!("  {}  – publish a text command", "/say <topic> <text>".bold().cyan());
    println!("  {}  – publish raw JSON", "/publish <topic> <type> <json>".bold().cyan());
    println!("  {}          – connection and telemetry", "/status".bold().cyan());
    println!("  {}     – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(view: &SessionView) {
    let snap = &view.snapshot;
    let battery = snap
        .battery_percent
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "unknown".to_string());

    println!("{}", "Robot Status".bold().underline());
    println!("  Endpoint   : {}", view.endpoint.bold());
    println!("  Connection : {}", view.state.to_string().yellow());
    println!("  Battery    : {}", battery);
    println!(
        "  Pose       : x={:.2} m  y={:.2} m  θ={:.2} rad",
        snap.pose.x, snap.pose.y, snap.pose.theta
    );
    println!("  Status     : {}", snap.status);
    if let Some(err) = &view.last_error {
        println!("  Last error : {}", err.to_string().red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_with_and_without_url() {
        assert_eq!(
            parse("/connect"),
            Ok(ReplCommand::Session(SessionCommand::Connect(None)))
        );
        assert_eq!(
            parse("  /connect ws://10.0.0.2:9090 "),
            Ok(ReplCommand::Session(SessionCommand::Connect(Some(
                "ws://10.0.0.2:9090".to_string()
            ))))
        );
    }

    #[test]
    fn parses_drive_keys_and_stop() {
        assert_eq!(
            parse("/a"),
            Ok(ReplCommand::Session(SessionCommand::Drive(Direction::Left)))
        );
        assert_eq!(
            parse("/stop"),
            Ok(ReplCommand::Session(SessionCommand::EmergencyStop))
        );
    }

    #[test]
    fn parses_velocity() {
        assert_eq!(
            parse("/vel 0.2 -0.5"),
            Ok(ReplCommand::Session(SessionCommand::Send(
                OutboundCommand::Velocity {
                    linear: 0.2,
                    angular: -0.5
                }
            )))
        );
        assert!(parse("/vel 0.2").is_err());
        assert!(parse("/vel fast slow").is_err());
    }

    #[test]
    fn parses_say_keeps_spaces_in_text() {
        assert_eq!(
            parse("/say /robot_cmd go to dock"),
            Ok(ReplCommand::Session(SessionCommand::Send(OutboundCommand::Text {
                topic: "/robot_cmd".to_string(),
                data: "go to dock".to_string(),
            })))
        );
    }

    #[test]
    fn parses_publish_json() {
        let cmd = parse(r#"/publish /led std_msgs/Bool {"data": true}"#).unwrap();
        match cmd {
            ReplCommand::Session(SessionCommand::Publish {
                topic,
                msg_type,
                payload,
            }) => {
                assert_eq!(topic, "/led");
                assert_eq!(msg_type, "std_msgs/Bool");
                assert_eq!(payload["data"], true);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("/publish /led std_msgs/Bool {oops").is_err());
    }

    #[test]
    fn rejects_unknown_and_incomplete() {
        assert!(parse("/fly").is_err());
        assert!(parse("/endpoint").is_err());
        assert_eq!(parse("/quit"), Ok(ReplCommand::Quit));
    }
}
